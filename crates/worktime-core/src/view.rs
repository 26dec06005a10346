//! Read model of a work day as returned to callers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::DailyTargetPolicy;
use crate::session::{format_seconds, SessionKind, Totals};
use crate::workday::{WorkDay, WorkDayStatus};
use crate::{OwnerId, WorkDayId};

/// Rounds to two decimals.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn hours(seconds: u64) -> f64 {
    round2(seconds as f64 / 3_600.0)
}

/// Snapshot of one owner's day with derived figures.
///
/// `work_day_id` is `None` when no record exists yet for the date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDayView {
    pub owner_id: OwnerId,
    pub date: NaiveDate,
    pub work_day_id: Option<WorkDayId>,
    pub status: WorkDayStatus,

    pub net_seconds: u64,
    pub pause_seconds: u64,
    pub total_seconds: u64,
    pub net_hours: f64,
    pub pause_hours: f64,
    pub total_hours: f64,
    pub net_display: String,
    pub pause_display: String,
    pub total_display: String,

    pub daily_target_seconds: u64,
    pub daily_target_hours: f64,
    /// Share of the target reached, capped at 100.
    pub progress_percentage: f64,
    /// Share of the target reached, uncapped.
    pub extended_percentage: f64,
    /// Net seconds beyond the target.
    pub extra_seconds: u64,
    /// Net seconds still missing to reach the target.
    pub remaining_seconds: u64,
    pub is_work_day: bool,

    pub open_session: Option<SessionKind>,
    pub session_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub start_within_hours: Option<bool>,
    pub end_within_hours: Option<bool>,
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// Set when a start found the day already running.
    #[serde(default)]
    pub already_started: bool,
}

impl WorkDayView {
    /// Builds the view of `day` with live totals as of `now`.
    pub fn of(day: &WorkDay, policy: &DailyTargetPolicy, now: DateTime<Utc>) -> Self {
        let mut view = Self::base(
            day.owner_id(),
            day.date(),
            policy,
            day.live_totals(now),
        );
        view.work_day_id = Some(day.id());
        view.status = day.status();
        view.open_session = day.open_kind();
        view.session_count = day.log().len();
        view.start_time = day.start_time();
        view.end_time = day.end_time();
        view.start_within_hours = day.start_time().map(|t| policy.within_working_hours(t));
        view.end_within_hours = day.end_time().map(|t| policy.within_working_hours(t));
        view.last_synced_at = day.last_synced_at();
        view.notes = day.notes().map(str::to_string);
        view
    }

    /// The "no active day" shape: zero totals, target still reported.
    pub fn no_active_day(owner_id: OwnerId, date: NaiveDate, policy: &DailyTargetPolicy) -> Self {
        Self::base(owner_id, date, policy, Totals::default())
    }

    /// Marks the view as the answer to a start on a running day.
    #[must_use]
    pub fn with_already_started(mut self, already_started: bool) -> Self {
        self.already_started = already_started;
        self
    }

    /// Returns true if a work-day record backs this view.
    pub fn has_day(&self) -> bool {
        self.work_day_id.is_some()
    }

    fn base(owner_id: OwnerId, date: NaiveDate, policy: &DailyTargetPolicy, totals: Totals) -> Self {
        let target = policy.target_seconds(date);
        let net = totals.net_seconds();
        let extended = if target == 0 {
            0.0
        } else {
            round2(net as f64 / target as f64 * 100.0)
        };

        Self {
            owner_id,
            date,
            work_day_id: None,
            status: WorkDayStatus::Pending,
            net_seconds: net,
            pause_seconds: totals.pause_seconds(),
            total_seconds: totals.total_seconds(),
            net_hours: hours(net),
            pause_hours: hours(totals.pause_seconds()),
            total_hours: hours(totals.total_seconds()),
            net_display: format_seconds(net),
            pause_display: format_seconds(totals.pause_seconds()),
            total_display: format_seconds(totals.total_seconds()),
            daily_target_seconds: target,
            daily_target_hours: hours(target),
            progress_percentage: extended.min(100.0),
            extended_percentage: extended,
            extra_seconds: net.saturating_sub(target),
            remaining_seconds: target.saturating_sub(net),
            is_work_day: target > 0,
            open_session: None,
            session_count: 0,
            start_time: None,
            end_time: None,
            start_within_hours: None,
            end_within_hours: None,
            last_synced_at: None,
            notes: None,
            already_started: false,
        }
    }
}
