//! The timesheet: every work day, keyed by owner and date.
//!
//! Enforces the owner-level timer scope across days: an owner never has open
//! sessions on two different days at once.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::guard::ActiveTimerGuard;
use crate::ids::IdSequence;
use crate::schedule::DailyTargetPolicy;
use crate::sync::{assess, Authority, SyncDecision, SyncRequest};
use crate::view::WorkDayView;
use crate::workday::WorkDay;
use crate::{DomainError, DomainResult, OwnerId, WorkDayId};

/// In-memory store of work days plus the owner guard.
#[derive(Debug, Default)]
pub struct Timesheet {
    days: HashMap<WorkDayId, WorkDay>,
    by_key: HashMap<(OwnerId, NaiveDate), WorkDayId>,
    guard: ActiveTimerGuard<OwnerId, WorkDayId>,
    ids: IdSequence,
    policy: DailyTargetPolicy,
}

impl Timesheet {
    /// Creates an empty timesheet using `policy` for targets.
    pub fn new(policy: DailyTargetPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> &DailyTargetPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn get(&self, id: WorkDayId) -> Option<&WorkDay> {
        self.days.get(&id)
    }

    /// The record for `owner_id` on `date`, if one exists.
    pub fn find(&self, owner_id: OwnerId, date: NaiveDate) -> Option<&WorkDay> {
        self.by_key
            .get(&(owner_id, date))
            .and_then(|id| self.days.get(id))
    }

    /// The day of `owner_id` holding an open session, if any.
    pub fn running_day(&self, owner_id: OwnerId) -> Option<WorkDayId> {
        self.guard.blocking(&owner_id)
    }

    // ========================================================================
    // Operations
    // ========================================================================

    /// Starts the owner's day, continuing it if paused or completed.
    pub fn start(
        &mut self,
        owner_id: OwnerId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkDayView> {
        // Checked before anything is created
        if !self.policy.is_work_day(date) {
            debug!(owner_id = %owner_id, date = %date, "Start rejected on non-work day");
            return Err(DomainError::NotWorkDay { date });
        }

        let existing = self.by_key.get(&(owner_id, date)).copied();
        self.ensure_owner_free(owner_id, existing)?;

        let id = match existing {
            Some(id) => id,
            None => self.insert(owner_id, date),
        };
        let outcome = self.day_mut(id)?.start(now)?;
        self.sync_guard(id);

        info!(
            owner_id = %owner_id,
            date = %date,
            work_day_id = %id,
            outcome = ?outcome,
            "Work day start"
        );
        Ok(self
            .view(id, now)?
            .with_already_started(outcome.already_started()))
    }

    /// Pauses a running day.
    pub fn pause(
        &mut self,
        owner_id: OwnerId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkDayView> {
        let id = self.lookup(owner_id, date)?;
        self.ensure_owner_free(owner_id, Some(id))?;
        self.day_mut(id)?.pause(now)?;
        self.sync_guard(id);

        info!(owner_id = %owner_id, date = %date, work_day_id = %id, "Work day paused");
        self.view(id, now)
    }

    /// Resumes a paused day.
    pub fn resume(
        &mut self,
        owner_id: OwnerId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkDayView> {
        let id = self
            .by_key
            .get(&(owner_id, date))
            .copied()
            .ok_or(DomainError::NotPaused { owner_id, date })?;
        self.ensure_owner_free(owner_id, Some(id))?;
        self.day_mut(id)?.resume(now)?;
        self.sync_guard(id);

        info!(owner_id = %owner_id, date = %date, work_day_id = %id, "Work day resumed");
        self.view(id, now)
    }

    /// Ends the day, storing `notes` if given.
    pub fn end_day(
        &mut self,
        owner_id: OwnerId,
        date: NaiveDate,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkDayView> {
        let id = self.lookup(owner_id, date)?;
        let target = self.policy.target_seconds(date);
        let day = self.day_mut(id)?;
        let report = day.end(now, target)?;
        if notes.is_some() {
            day.set_notes(notes);
        }
        self.sync_guard(id);

        info!(
            owner_id = %owner_id,
            date = %date,
            work_day_id = %id,
            net_seconds = report.totals.net_seconds(),
            extra_seconds = report.extra_seconds,
            "Work day ended"
        );
        self.view(id, now)
    }

    /// Restores an active day's open session, or starts the day.
    pub fn resume_or_start(
        &mut self,
        owner_id: OwnerId,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> DomainResult<WorkDayView> {
        let active = self
            .find(owner_id, date)
            .filter(|day| day.status().is_active())
            .map(WorkDay::id);

        let Some(id) = active else {
            return self.start(owner_id, date, now);
        };

        self.ensure_owner_free(owner_id, Some(id))?;
        let outcome = self.day_mut(id)?.resume_or_start(now)?;
        self.sync_guard(id);
        Ok(self
            .view(id, now)?
            .with_already_started(outcome.already_started()))
    }

    /// Current view of the owner's day; never fails.
    ///
    /// Refreshes the cached totals of an existing record.
    pub fn status(&mut self, owner_id: OwnerId, date: NaiveDate, now: DateTime<Utc>) -> WorkDayView {
        let Some(id) = self.by_key.get(&(owner_id, date)).copied() else {
            return WorkDayView::no_active_day(owner_id, date, &self.policy);
        };
        match self.days.get_mut(&id) {
            Some(day) => {
                day.refresh_totals(now);
                WorkDayView::of(day, &self.policy, now)
            }
            None => WorkDayView::no_active_day(owner_id, date, &self.policy),
        }
    }

    /// Reconciles a client's elapsed time with the server log.
    pub fn sync(
        &mut self,
        request: &SyncRequest,
        threshold_secs: u64,
        now: DateTime<Utc>,
    ) -> DomainResult<SyncDecision> {
        let day = self
            .days
            .get_mut(&request.work_day_id)
            .ok_or(DomainError::WorkDayNotFound(request.work_day_id))?;

        let server_seconds = day.refresh_totals(now).net_seconds();
        let (drift, authoritative) = assess(server_seconds, request.elapsed_seconds, threshold_secs);

        let mut status_healed = false;
        match authoritative {
            Authority::Server => {
                warn!(
                    work_day_id = %request.work_day_id,
                    server_seconds,
                    client_seconds = request.elapsed_seconds,
                    drift,
                    "Client drifted beyond threshold, server value wins"
                );
            }
            Authority::Client => {
                if request.is_running {
                    status_healed = day.mark_running();
                }
                day.record_sync(now);
                debug!(
                    work_day_id = %request.work_day_id,
                    drift,
                    last_sync_at = ?request.last_sync_at,
                    status_healed,
                    "Client sync accepted"
                );
            }
        }

        Ok(SyncDecision {
            work_day_id: request.work_day_id,
            server_seconds,
            client_seconds: request.elapsed_seconds,
            drift,
            authoritative,
            status: day.status(),
            status_healed,
        })
    }

    /// Refreshes every day with an open session and returns their views.
    pub fn refresh_running(&mut self, now: DateTime<Utc>) -> Vec<WorkDayView> {
        let policy = &self.policy;
        self.days
            .values_mut()
            .filter(|day| day.has_open_session())
            .map(|day| {
                day.refresh_totals(now);
                WorkDayView::of(day, policy, now)
            })
            .collect()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn insert(&mut self, owner_id: OwnerId, date: NaiveDate) -> WorkDayId {
        let id = WorkDayId::new(self.ids.next_raw());
        self.days.insert(id, WorkDay::new(id, owner_id, date));
        self.by_key.insert((owner_id, date), id);
        debug!(owner_id = %owner_id, date = %date, work_day_id = %id, "Work day created");
        id
    }

    fn lookup(&self, owner_id: OwnerId, date: NaiveDate) -> DomainResult<WorkDayId> {
        self.by_key
            .get(&(owner_id, date))
            .copied()
            .ok_or(DomainError::NoActiveDay { owner_id, date })
    }

    fn day_mut(&mut self, id: WorkDayId) -> DomainResult<&mut WorkDay> {
        self.days
            .get_mut(&id)
            .ok_or(DomainError::WorkDayNotFound(id))
    }

    fn view(&self, id: WorkDayId, now: DateTime<Utc>) -> DomainResult<WorkDayView> {
        self.days
            .get(&id)
            .map(|day| WorkDayView::of(day, &self.policy, now))
            .ok_or(DomainError::WorkDayNotFound(id))
    }

    /// Fails if another day of the owner holds the owner scope.
    ///
    /// A claim pointing at a day that no longer has an open session is stale
    /// and is released.
    fn ensure_owner_free(&mut self, owner_id: OwnerId, current: Option<WorkDayId>) -> DomainResult<()> {
        let Some(blocking) = self.guard.blocking(&owner_id) else {
            return Ok(());
        };
        if Some(blocking) == current {
            return Ok(());
        }

        let still_open = self
            .days
            .get(&blocking)
            .is_some_and(WorkDay::has_open_session);
        if !still_open {
            warn!(
                owner_id = %owner_id,
                work_day_id = %blocking,
                "Releasing stale owner claim without open session"
            );
            self.guard.release(blocking);
            return Ok(());
        }

        Err(DomainError::AlreadyRunning { owner_id, blocking })
    }

    /// Makes the owner claim match the day's open-session state.
    fn sync_guard(&mut self, id: WorkDayId) {
        let Some(day) = self.days.get(&id) else {
            return;
        };
        let owner_id = day.owner_id();
        let open = day.has_open_session();

        self.guard.release(id);
        if open {
            if let Err(blocking) = self.guard.try_claim(&[owner_id], id) {
                warn!(
                    owner_id = %owner_id,
                    work_day_id = %id,
                    blocking = %blocking,
                    "Owner scope already claimed by another day"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::DEFAULT_DRIFT_THRESHOLD_SECS;
    use crate::workday::WorkDayStatus;
    use chrono::TimeZone;

    const OWNER: OwnerId = OwnerId::new(1);

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, h, m, 0).unwrap()
    }

    fn sheet() -> Timesheet {
        Timesheet::new(DailyTargetPolicy::default())
    }

    #[test]
    fn test_tuesday_scenario() {
        let mut sheet = sheet();
        sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        sheet.pause(OWNER, tuesday(), at(2, 12, 0)).unwrap();
        sheet.resume(OWNER, tuesday(), at(2, 13, 0)).unwrap();
        let view = sheet
            .end_day(OWNER, tuesday(), Some("release".to_string()), at(2, 17, 30))
            .unwrap();

        assert_eq!(view.net_seconds, 27_000);
        assert_eq!(view.pause_seconds, 3_600);
        assert_eq!(view.daily_target_seconds, 28_800);
        assert_eq!(view.extra_seconds, 0);
        assert_eq!(view.progress_percentage, 93.75);
        assert_eq!(view.status, WorkDayStatus::Completed);
        assert_eq!(view.notes.as_deref(), Some("release"));
        assert_eq!(sheet.running_day(OWNER), None);
    }

    #[test]
    fn test_sunday_start_creates_nothing() {
        let mut sheet = sheet();
        let sunday = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        let err = sheet.start(OWNER, sunday, at(7, 10, 0)).unwrap_err();
        assert_eq!(err, DomainError::NotWorkDay { date: sunday });
        assert!(sheet.is_empty());
        assert!(sheet.find(OWNER, sunday).is_none());
    }

    #[test]
    fn test_start_twice_reports_already_started() {
        let mut sheet = sheet();
        let first = sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        assert!(!first.already_started);
        let second = sheet.start(OWNER, tuesday(), at(2, 9, 5)).unwrap();
        assert!(second.already_started);
        assert_eq!(second.work_day_id, first.work_day_id);
        assert_eq!(second.session_count, 1);
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn test_other_day_blocks_start() {
        let mut sheet = sheet();
        let monday = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let running = sheet.start(OWNER, monday, at(1, 9, 0)).unwrap();

        let err = sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap_err();
        assert_eq!(
            err,
            DomainError::AlreadyRunning {
                owner_id: OWNER,
                blocking: running.work_day_id.unwrap(),
            }
        );
        // The rejected start did not create a row
        assert!(sheet.find(OWNER, tuesday()).is_none());

        sheet.end_day(OWNER, monday, None, at(1, 17, 0)).unwrap();
        assert!(sheet.start(OWNER, tuesday(), at(2, 9, 0)).is_ok());
    }

    #[test]
    fn test_owners_are_independent() {
        let mut sheet = sheet();
        sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        assert!(sheet
            .start(OwnerId::new(2), tuesday(), at(2, 9, 0))
            .is_ok());
        assert_eq!(sheet.len(), 2);
    }

    #[test]
    fn test_end_twice_hints_start() {
        let mut sheet = sheet();
        sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        sheet.end_day(OWNER, tuesday(), None, at(2, 12, 0)).unwrap();
        let err = sheet
            .end_day(OWNER, tuesday(), None, at(2, 13, 0))
            .unwrap_err();
        assert!(matches!(err, DomainError::AlreadyCompleted { .. }));

        // Continue as overtime on the same record
        let view = sheet.start(OWNER, tuesday(), at(2, 13, 0)).unwrap();
        assert_eq!(view.status, WorkDayStatus::InProgress);
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn test_missing_day_errors() {
        let mut sheet = sheet();
        assert!(matches!(
            sheet.pause(OWNER, tuesday(), at(2, 9, 0)),
            Err(DomainError::NoActiveDay { .. })
        ));
        assert!(matches!(
            sheet.resume(OWNER, tuesday(), at(2, 9, 0)),
            Err(DomainError::NotPaused { .. })
        ));
        assert!(matches!(
            sheet.end_day(OWNER, tuesday(), None, at(2, 9, 0)),
            Err(DomainError::NoActiveDay { .. })
        ));
    }

    #[test]
    fn test_status_without_day() {
        let mut sheet = sheet();
        let view = sheet.status(OWNER, tuesday(), at(2, 9, 0));
        assert!(!view.has_day());
        assert_eq!(view.daily_target_seconds, 28_800);
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_status_refreshes_cache() {
        let mut sheet = sheet();
        let view = sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        let id = view.work_day_id.unwrap();
        let status = sheet.status(OWNER, tuesday(), at(2, 10, 0));
        assert_eq!(status.net_seconds, 3_600);
        assert_eq!(sheet.get(id).unwrap().cached_totals().net_seconds(), 3_600);
    }

    #[test]
    fn test_sync_drift_beyond_threshold() {
        let mut sheet = sheet();
        let id = sheet
            .start(OWNER, tuesday(), at(2, 9, 0))
            .unwrap()
            .work_day_id
            .unwrap();
        let request = SyncRequest {
            work_day_id: id,
            elapsed_seconds: 3_000,
            is_running: true,
            last_sync_at: None,
        };
        let decision = sheet
            .sync(&request, DEFAULT_DRIFT_THRESHOLD_SECS, at(2, 10, 0))
            .unwrap();
        assert_eq!(decision.server_seconds, 3_600);
        assert_eq!(decision.drift, 600);
        assert_eq!(decision.authoritative, Authority::Server);
        assert_eq!(sheet.get(id).unwrap().last_synced_at(), None);
    }

    #[test]
    fn test_sync_within_threshold_heals_status() {
        let mut sheet = sheet();
        let id = sheet
            .start(OWNER, tuesday(), at(2, 9, 0))
            .unwrap()
            .work_day_id
            .unwrap();
        sheet.pause(OWNER, tuesday(), at(2, 10, 0)).unwrap();

        let request = SyncRequest {
            work_day_id: id,
            elapsed_seconds: 3_580,
            is_running: true,
            last_sync_at: Some(at(2, 9, 30)),
        };
        let decision = sheet
            .sync(&request, DEFAULT_DRIFT_THRESHOLD_SECS, at(2, 10, 0))
            .unwrap();
        assert_eq!(decision.drift, 20);
        assert_eq!(decision.authoritative, Authority::Client);
        assert!(decision.status_healed);
        assert_eq!(decision.status, WorkDayStatus::InProgress);

        let day = sheet.get(id).unwrap();
        // Stored totals stay the server's
        assert_eq!(day.cached_totals().net_seconds(), 3_600);
        assert_eq!(day.log().len(), 2);
        assert_eq!(day.last_synced_at(), Some(at(2, 10, 0)));
    }

    #[test]
    fn test_sync_unknown_day() {
        let mut sheet = sheet();
        let request = SyncRequest {
            work_day_id: WorkDayId::new(42),
            elapsed_seconds: 0,
            is_running: false,
            last_sync_at: None,
        };
        assert_eq!(
            sheet.sync(&request, 300, at(2, 9, 0)).unwrap_err(),
            DomainError::WorkDayNotFound(WorkDayId::new(42))
        );
    }

    #[test]
    fn test_resume_or_start_after_healed_sync() {
        let mut sheet = sheet();
        let id = sheet
            .start(OWNER, tuesday(), at(2, 9, 0))
            .unwrap()
            .work_day_id
            .unwrap();
        sheet.end_day(OWNER, tuesday(), None, at(2, 10, 0)).unwrap();
        let request = SyncRequest {
            work_day_id: id,
            elapsed_seconds: 3_600,
            is_running: true,
            last_sync_at: None,
        };
        sheet.sync(&request, 300, at(2, 10, 0)).unwrap();
        assert_eq!(sheet.running_day(OWNER), None);

        let view = sheet.resume_or_start(OWNER, tuesday(), at(2, 10, 30)).unwrap();
        assert_eq!(view.open_session, Some(crate::SessionKind::Work));
        assert_eq!(sheet.running_day(OWNER), Some(id));
    }

    #[test]
    fn test_resume_or_start_after_sync_on_paused_day() {
        let mut sheet = sheet();
        let id = sheet
            .start(OWNER, tuesday(), at(2, 9, 0))
            .unwrap()
            .work_day_id
            .unwrap();
        sheet.pause(OWNER, tuesday(), at(2, 10, 0)).unwrap();
        let request = SyncRequest {
            work_day_id: id,
            elapsed_seconds: 3_580,
            is_running: true,
            last_sync_at: None,
        };
        assert!(sheet.sync(&request, 300, at(2, 10, 0)).unwrap().status_healed);

        let view = sheet.resume_or_start(OWNER, tuesday(), at(2, 10, 0)).unwrap();
        assert_eq!(view.status, WorkDayStatus::InProgress);
        assert_eq!(view.open_session, Some(crate::SessionKind::Work));

        let later = sheet.status(OWNER, tuesday(), at(2, 12, 0));
        assert_eq!(later.net_seconds, 3 * 3_600);
        assert_eq!(later.open_session, Some(crate::SessionKind::Work));
    }

    #[test]
    fn test_refresh_running_only_open_days() {
        let mut sheet = sheet();
        sheet.start(OWNER, tuesday(), at(2, 9, 0)).unwrap();
        sheet.start(OwnerId::new(2), tuesday(), at(2, 9, 0)).unwrap();
        sheet
            .end_day(OwnerId::new(2), tuesday(), None, at(2, 9, 30))
            .unwrap();

        let views = sheet.refresh_running(at(2, 11, 0));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].owner_id, OWNER);
        assert_eq!(views[0].net_seconds, 7_200);
    }
}
