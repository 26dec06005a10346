//! Work-day aggregate and its state machine.
//!
//! ```text
//!            start            pause
//! Pending ─────────▶ InProgress ─────▶ Paused
//!                     ▲   │  ▲  resume  │
//!                     │   │  └──────────┘
//!      start (overtime)   │ end           │ end
//!                     │   ▼               ▼
//!                     └─ Completed ◀──────┘
//! ```
//!
//! Every transition closes/opens sessions on the log and then recomputes the
//! cached totals, so the cache never diverges from the log.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::session::{SessionKind, SessionLog, Totals};
use crate::{DomainError, DomainResult, OwnerId, WorkDayId};

// ============================================================================
// Status
// ============================================================================

/// Lifecycle status of a work day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkDayStatus {
    /// Not started yet.
    #[default]
    Pending,
    /// A work session is running.
    InProgress,
    /// A pause session is running.
    Paused,
    /// The day was ended. Starting again continues it as overtime.
    Completed,
}

impl WorkDayStatus {
    /// Returns the display label for this status.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    /// Returns true while the day is started and not completed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InProgress | Self::Paused)
    }
}

impl fmt::Display for WorkDayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InProgress => write!(f, "In Progress"),
            Self::Paused => write!(f, "Paused"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

// ============================================================================
// Transition Outcomes
// ============================================================================

/// What a start (or resume-or-start) actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The day was pending and is now running.
    Started,
    /// The day was already running; nothing was opened.
    AlreadyStarted,
    /// A paused day went back to work.
    ResumedFromPause,
    /// A completed day was reopened as overtime.
    Continued,
    /// An active day had no open session and one was opened.
    Healed,
}

impl StartOutcome {
    /// Returns true if the call found the day already running.
    #[must_use]
    pub fn already_started(&self) -> bool {
        matches!(self, Self::AlreadyStarted)
    }
}

/// Result of ending a day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndReport {
    pub totals: Totals,
    pub target_seconds: u64,
    /// Net seconds beyond the target.
    pub extra_seconds: u64,
}

// ============================================================================
// Work Day
// ============================================================================

/// One owner's time-tracking record for one calendar date.
///
/// Fields are private: status, timestamps and cached totals change only
/// through the transition methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDay {
    id: WorkDayId,
    owner_id: OwnerId,
    date: NaiveDate,
    status: WorkDayStatus,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    pause_start: Option<DateTime<Utc>>,
    pause_end: Option<DateTime<Utc>>,
    /// Snapshot of the last recompute.
    totals: Totals,
    notes: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    log: SessionLog,
}

impl WorkDay {
    /// Creates a pending day.
    pub fn new(id: WorkDayId, owner_id: OwnerId, date: NaiveDate) -> Self {
        Self {
            id,
            owner_id,
            date,
            status: WorkDayStatus::Pending,
            start_time: None,
            end_time: None,
            pause_start: None,
            pause_end: None,
            totals: Totals::default(),
            notes: None,
            last_synced_at: None,
            log: SessionLog::new(),
        }
    }

    pub fn id(&self) -> WorkDayId {
        self.id
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn status(&self) -> WorkDayStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn pause_start(&self) -> Option<DateTime<Utc>> {
        self.pause_start
    }

    pub fn pause_end(&self) -> Option<DateTime<Utc>> {
        self.pause_end
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    pub fn log(&self) -> &SessionLog {
        &self.log
    }

    /// Cached totals from the last recompute.
    pub fn cached_totals(&self) -> Totals {
        self.totals
    }

    /// Returns true if an interval is currently running.
    pub fn has_open_session(&self) -> bool {
        self.log.open_session().is_some()
    }

    /// Kind of the running interval, if any.
    pub fn open_kind(&self) -> Option<SessionKind> {
        self.log.open_session().map(|s| s.kind)
    }

    /// Totals as of `now`, without touching the cache.
    pub fn live_totals(&self, now: DateTime<Utc>) -> Totals {
        self.log.recompute(now)
    }

    /// Recomputes totals as of `now` and stores them in the cache.
    pub fn refresh_totals(&mut self, now: DateTime<Utc>) -> Totals {
        self.totals = self.log.recompute(now);
        self.totals
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Starts (or continues) the day.
    ///
    /// - Pending: opens the first work session.
    /// - InProgress: no-op, reports [`StartOutcome::AlreadyStarted`].
    /// - Paused: closes the pause and opens work.
    /// - Completed: reopens the same record for overtime.
    pub fn start(&mut self, now: DateTime<Utc>) -> DomainResult<StartOutcome> {
        let outcome = match self.status {
            WorkDayStatus::Pending => {
                self.start_time.get_or_insert(now);
                self.log.close_open(now);
                self.log.open(SessionKind::Work, now)?;
                StartOutcome::Started
            }
            WorkDayStatus::InProgress => StartOutcome::AlreadyStarted,
            WorkDayStatus::Paused => {
                self.log.close_open(now);
                self.log.open(SessionKind::Work, now)?;
                self.pause_end = Some(now);
                StartOutcome::ResumedFromPause
            }
            WorkDayStatus::Completed => {
                if self.log.close_open(now).is_some() {
                    warn!(
                        work_day_id = %self.id,
                        "Completed day still had an open session, closed it"
                    );
                }
                self.log.open(SessionKind::Work, now)?;
                self.end_time = None;
                StartOutcome::Continued
            }
        };

        self.status = WorkDayStatus::InProgress;
        self.refresh_totals(now);

        debug!(
            work_day_id = %self.id,
            owner_id = %self.owner_id,
            outcome = ?outcome,
            net_seconds = self.totals.net_seconds(),
            "Work day started"
        );

        Ok(outcome)
    }

    /// Pauses a running day.
    pub fn pause(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != WorkDayStatus::InProgress {
            return Err(DomainError::NoActiveDay {
                owner_id: self.owner_id,
                date: self.date,
            });
        }

        self.log.close_open(now);
        self.log.open(SessionKind::Pause, now)?;
        self.pause_start = Some(now);
        self.status = WorkDayStatus::Paused;
        self.refresh_totals(now);
        Ok(())
    }

    /// Resumes a paused day.
    pub fn resume(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != WorkDayStatus::Paused {
            return Err(DomainError::NotPaused {
                owner_id: self.owner_id,
                date: self.date,
            });
        }

        self.log.close_open(now);
        self.log.open(SessionKind::Work, now)?;
        self.pause_end = Some(now);
        self.status = WorkDayStatus::InProgress;
        self.refresh_totals(now);
        Ok(())
    }

    /// Ends the day and reports overtime against `target_seconds`.
    pub fn end(&mut self, now: DateTime<Utc>, target_seconds: u64) -> DomainResult<EndReport> {
        match self.status {
            WorkDayStatus::InProgress | WorkDayStatus::Paused => {}
            WorkDayStatus::Completed => {
                return Err(DomainError::AlreadyCompleted {
                    owner_id: self.owner_id,
                    date: self.date,
                });
            }
            WorkDayStatus::Pending => {
                return Err(DomainError::NoActiveDay {
                    owner_id: self.owner_id,
                    date: self.date,
                });
            }
        }

        self.log.close_open(now);
        let totals = self.refresh_totals(now);
        self.status = WorkDayStatus::Completed;
        self.end_time = Some(now);

        Ok(EndReport {
            totals,
            target_seconds,
            extra_seconds: totals.net_seconds().saturating_sub(target_seconds),
        })
    }

    /// Makes sure an active day has exactly one open session of the kind its
    /// status implies, or starts it.
    ///
    /// An in-progress day gets a work session, a paused one a pause session.
    /// A session of the wrong kind is closed at `now` and replaced.
    pub fn resume_or_start(&mut self, now: DateTime<Utc>) -> DomainResult<StartOutcome> {
        let kind = match self.status {
            WorkDayStatus::InProgress => SessionKind::Work,
            WorkDayStatus::Paused => SessionKind::Pause,
            WorkDayStatus::Pending | WorkDayStatus::Completed => return self.start(now),
        };

        let outcome = match self.open_kind() {
            Some(open) if open == kind => StartOutcome::AlreadyStarted,
            Some(open) => {
                warn!(
                    work_day_id = %self.id,
                    status = %self.status,
                    open = %open,
                    kind = %kind,
                    "Open session does not match day status, replacing it"
                );
                self.log.close_open(now);
                self.log.open(kind, now)?;
                match kind {
                    SessionKind::Work => self.pause_end = Some(now),
                    SessionKind::Pause => self.pause_start = Some(now),
                }
                StartOutcome::Healed
            }
            None => {
                warn!(
                    work_day_id = %self.id,
                    status = %self.status,
                    kind = %kind,
                    "Active day without open session, opening one"
                );
                self.log.open(kind, now)?;
                StartOutcome::Healed
            }
        };

        self.refresh_totals(now);
        Ok(outcome)
    }

    /// Flags the day as running without touching the session log.
    ///
    /// Returns true if the status changed.
    pub fn mark_running(&mut self) -> bool {
        if self.status == WorkDayStatus::InProgress {
            return false;
        }
        self.status = WorkDayStatus::InProgress;
        true
    }

    /// Records a successful client sync.
    pub fn record_sync(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(at);
    }

    /// Replaces the free-text notes.
    pub fn set_notes(&mut self, notes: Option<String>) {
        self.notes = notes.filter(|n| !n.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, m, 0).unwrap()
    }

    fn create_test_day() -> WorkDay {
        WorkDay::new(
            WorkDayId::new(1),
            OwnerId::new(7),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
    }

    #[test]
    fn test_tuesday_scenario() {
        let mut day = create_test_day();
        assert_eq!(day.start(at(9, 0)).unwrap(), StartOutcome::Started);
        day.pause(at(12, 0)).unwrap();
        day.resume(at(13, 0)).unwrap();
        let report = day.end(at(17, 30), 28_800).unwrap();

        assert_eq!(report.totals.net_seconds(), 27_000);
        assert_eq!(report.totals.pause_seconds(), 3_600);
        assert_eq!(report.totals.total_seconds(), 30_600);
        assert_eq!(report.extra_seconds, 0);
        assert_eq!(day.status(), WorkDayStatus::Completed);
        assert_eq!(day.start_time(), Some(at(9, 0)));
        assert_eq!(day.end_time(), Some(at(17, 30)));
        assert_eq!(day.pause_start(), Some(at(12, 0)));
        assert_eq!(day.pause_end(), Some(at(13, 0)));
        assert!(!day.has_open_session());
    }

    #[test]
    fn test_overtime_extra_seconds() {
        let mut day = create_test_day();
        day.start(at(8, 0)).unwrap();
        // 30000 seconds = 8h 20m
        let report = day.end(at(16, 20), 28_800).unwrap();
        assert_eq!(report.totals.net_seconds(), 30_000);
        assert_eq!(report.extra_seconds, 1_200);
    }

    #[test]
    fn test_start_when_running_is_idempotent() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        let outcome = day.start(at(10, 0)).unwrap();
        assert!(outcome.already_started());
        assert_eq!(day.log().len(), 1);
        assert_eq!(day.cached_totals().net_seconds(), 3_600);
    }

    #[test]
    fn test_start_from_paused_resumes() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.pause(at(10, 0)).unwrap();
        assert_eq!(
            day.start(at(10, 15)).unwrap(),
            StartOutcome::ResumedFromPause
        );
        assert_eq!(day.status(), WorkDayStatus::InProgress);
        assert_eq!(day.open_kind(), Some(SessionKind::Work));
        assert_eq!(day.log().open_count(), 1);
    }

    #[test]
    fn test_continue_after_completion_reuses_record() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.end(at(17, 0), 28_800).unwrap();

        assert_eq!(day.start(at(18, 0)).unwrap(), StartOutcome::Continued);
        assert_eq!(day.id(), WorkDayId::new(1));
        assert_eq!(day.status(), WorkDayStatus::InProgress);
        assert_eq!(day.end_time(), None);

        let report = day.end(at(19, 0), 28_800).unwrap();
        assert_eq!(report.totals.net_seconds(), 9 * 3_600);
        assert_eq!(report.extra_seconds, 3_600);
    }

    #[test]
    fn test_end_twice_is_rejected() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.end(at(12, 0), 28_800).unwrap();
        let err = day.end(at(13, 0), 28_800).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyCompleted { .. }));
        assert_eq!(day.end_time(), Some(at(12, 0)));
    }

    #[test]
    fn test_illegal_transitions() {
        let mut day = create_test_day();
        assert!(matches!(
            day.pause(at(9, 0)),
            Err(DomainError::NoActiveDay { .. })
        ));
        assert!(matches!(
            day.resume(at(9, 0)),
            Err(DomainError::NotPaused { .. })
        ));
        assert!(matches!(
            day.end(at(9, 0), 0),
            Err(DomainError::NoActiveDay { .. })
        ));

        day.start(at(9, 0)).unwrap();
        assert!(matches!(
            day.resume(at(9, 30)),
            Err(DomainError::NotPaused { .. })
        ));
        assert_eq!(day.status(), WorkDayStatus::InProgress);
    }

    #[test]
    fn test_end_while_paused_counts_pause() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.pause(at(11, 0)).unwrap();
        let report = day.end(at(11, 30), 28_800).unwrap();
        assert_eq!(report.totals.net_seconds(), 7_200);
        assert_eq!(report.totals.pause_seconds(), 1_800);
    }

    #[test]
    fn test_at_most_one_open_session_over_action_sequence() {
        let mut day = create_test_day();
        let mut now = at(8, 0);
        let actions = [
            "start", "pause", "pause", "resume", "start", "end", "resume", "start", "pause",
            "start", "end", "end", "start",
        ];
        for action in actions {
            now += chrono::Duration::minutes(17);
            let _ = match action {
                "start" => day.start(now).map(|_| ()),
                "pause" => day.pause(now),
                "resume" => day.resume(now),
                _ => day.end(now, 28_800).map(|_| ()),
            };
            assert!(day.log().open_count() <= 1, "after {action}");
            let totals = day.live_totals(now);
            assert_eq!(
                totals.total_seconds(),
                totals.net_seconds() + totals.pause_seconds()
            );
        }
    }

    #[test]
    fn test_resume_or_start_heals_missing_session() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.end(at(10, 0), 28_800).unwrap();
        // A sync flagged the completed day as running without a session
        assert!(day.mark_running());
        assert!(!day.has_open_session());

        assert_eq!(day.resume_or_start(at(10, 30)).unwrap(), StartOutcome::Healed);
        assert_eq!(day.open_kind(), Some(SessionKind::Work));
        assert_eq!(
            day.resume_or_start(at(10, 45)).unwrap(),
            StartOutcome::AlreadyStarted
        );
        assert_eq!(day.log().open_count(), 1);
    }

    #[test]
    fn test_resume_or_start_replaces_mismatched_session() {
        let mut day = create_test_day();
        day.start(at(9, 0)).unwrap();
        day.pause(at(10, 0)).unwrap();
        // Status flipped to running while the pause is still open
        assert!(day.mark_running());
        assert_eq!(day.open_kind(), Some(SessionKind::Pause));
        assert!(matches!(day.resume(at(10, 0)), Err(DomainError::NotPaused { .. })));

        assert_eq!(day.resume_or_start(at(10, 0)).unwrap(), StartOutcome::Healed);
        assert_eq!(day.open_kind(), Some(SessionKind::Work));
        assert_eq!(day.pause_end(), Some(at(10, 0)));
        assert_eq!(day.log().open_count(), 1);
        assert_eq!(day.live_totals(at(12, 0)).net_seconds(), 3 * 3_600);

        assert_eq!(
            day.resume_or_start(at(12, 0)).unwrap(),
            StartOutcome::AlreadyStarted
        );
    }

    #[test]
    fn test_resume_or_start_on_pending_starts() {
        let mut day = create_test_day();
        assert_eq!(day.resume_or_start(at(9, 0)).unwrap(), StartOutcome::Started);
        assert_eq!(day.status(), WorkDayStatus::InProgress);
    }

    #[test]
    fn test_blank_notes_are_dropped() {
        let mut day = create_test_day();
        day.set_notes(Some("   ".to_string()));
        assert_eq!(day.notes(), None);
        day.set_notes(Some("deploy day".to_string()));
        assert_eq!(day.notes(), Some("deploy day"));
    }
}
