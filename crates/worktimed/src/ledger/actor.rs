//! Ledger actor - owns all time-tracking state and processes commands.
//!
//! The LedgerActor is the single writer for every work day and task timer.
//! Commands are processed one at a time, so a guard check and the claim that
//! follows it can never interleave with another request.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Domain failures are returned to the caller, never raised
//! - Channel send failures are logged but don't panic

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use worktime_core::{
    Clock, DomainResult, OwnerId, SyncDecision, SyncRequest, TaskTimeEntry, TaskTimers, Timesheet,
    WorkDayView,
};

use super::commands::{LedgerCommand, LedgerError, LedgerEvent};
use super::LedgerSettings;

// ============================================================================
// Ledger Actor
// ============================================================================

/// The ledger actor - owns the timesheet and the task timer book.
pub struct LedgerActor {
    /// Command receiver
    receiver: mpsc::Receiver<LedgerCommand>,

    /// Every work day, keyed by owner and date
    timesheet: Timesheet,

    /// Task-level timers
    timers: TaskTimers,

    /// Source of "now"
    clock: Arc<dyn Clock>,

    /// Drift above which client syncs are ignored
    drift_threshold_secs: u64,

    /// Event publisher for subscribed clients
    event_publisher: broadcast::Sender<LedgerEvent>,
}

impl LedgerActor {
    pub fn new(
        receiver: mpsc::Receiver<LedgerCommand>,
        event_publisher: broadcast::Sender<LedgerEvent>,
        settings: &LedgerSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            receiver,
            timesheet: Timesheet::new(settings.policy.clone()),
            timers: TaskTimers::new(),
            clock,
            drift_threshold_secs: settings.drift_threshold_secs,
            event_publisher,
        }
    }

    /// Runs the actor event loop until every sender is dropped.
    pub async fn run(mut self) {
        info!(
            drift_threshold_secs = self.drift_threshold_secs,
            "Ledger actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            work_days = self.timesheet.len(),
            running_timers = self.timers.running_count(),
            "Ledger actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: LedgerCommand) {
        match cmd {
            LedgerCommand::StartDay {
                owner_id,
                date,
                respond_to,
            } => {
                let result = self.apply_day(owner_id, date, |sheet, owner, date, now| {
                    sheet.start(owner, date, now)
                });
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            LedgerCommand::PauseDay {
                owner_id,
                date,
                respond_to,
            } => {
                let result = self.apply_day(owner_id, date, |sheet, owner, date, now| {
                    sheet.pause(owner, date, now)
                });
                let _ = respond_to.send(result);
            }
            LedgerCommand::ResumeDay {
                owner_id,
                date,
                respond_to,
            } => {
                let result = self.apply_day(owner_id, date, |sheet, owner, date, now| {
                    sheet.resume(owner, date, now)
                });
                let _ = respond_to.send(result);
            }
            LedgerCommand::EndDay {
                owner_id,
                date,
                notes,
                respond_to,
            } => {
                let result = self.apply_day(owner_id, date, move |sheet, owner, date, now| {
                    sheet.end_day(owner, date, notes, now)
                });
                let _ = respond_to.send(result);
            }
            LedgerCommand::ResumeOrStart {
                owner_id,
                date,
                respond_to,
            } => {
                let result = self.apply_day(owner_id, date, |sheet, owner, date, now| {
                    sheet.resume_or_start(owner, date, now)
                });
                let _ = respond_to.send(result);
            }
            LedgerCommand::DayStatus {
                owner_id,
                date,
                respond_to,
            } => {
                let now = self.clock.now();
                let date = self.resolve_date(date);
                let _ = respond_to.send(self.timesheet.status(owner_id, date, now));
            }
            LedgerCommand::Sync {
                request,
                respond_to,
            } => {
                let result = self.handle_sync(&request);
                let _ = respond_to.send(result);
            }
            LedgerCommand::StartTaskTimer {
                user_id,
                task_id,
                description,
                respond_to,
            } => {
                let now = self.clock.now();
                let result = self.timers.start(user_id, task_id, description, now);
                let _ = respond_to.send(self.publish_entry(result));
            }
            LedgerCommand::StopTaskTimer {
                entry_id,
                respond_to,
            } => {
                let now = self.clock.now();
                let result = self.timers.stop(entry_id, now);
                let _ = respond_to.send(self.publish_entry(result));
            }
            LedgerCommand::ActiveTaskTimer {
                user_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.timers.active_for_user(user_id).cloned());
            }
            LedgerCommand::TaskEntries {
                task_id,
                respond_to,
            } => {
                let now = self.clock.now();
                let entries = self.timers.entries_for_task(task_id);
                let total = self.timers.task_total_seconds(task_id, now);
                let _ = respond_to.send((entries, total));
            }
            LedgerCommand::RefreshRunning => {
                self.handle_refresh_running();
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Runs a day transition and publishes the resulting view.
    fn apply_day<F>(
        &mut self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        transition: F,
    ) -> Result<WorkDayView, LedgerError>
    where
        F: FnOnce(&mut Timesheet, OwnerId, NaiveDate, DateTime<Utc>) -> DomainResult<WorkDayView>,
    {
        let now = self.clock.now();
        let date = self.resolve_date(date);

        match transition(&mut self.timesheet, owner_id, date, now) {
            Ok(view) => {
                self.publish(LedgerEvent::DayUpdated {
                    day: Box::new(view.clone()),
                });
                Ok(view)
            }
            Err(err) => {
                debug!(
                    owner_id = %owner_id,
                    date = %date,
                    code = err.code(),
                    error = %err,
                    "Day command rejected"
                );
                Err(err.into())
            }
        }
    }

    fn handle_sync(&mut self, request: &SyncRequest) -> Result<SyncDecision, LedgerError> {
        let now = self.clock.now();
        let decision = self
            .timesheet
            .sync(request, self.drift_threshold_secs, now)?;

        if decision.status_healed {
            if let Some(day) = self.timesheet.get(decision.work_day_id) {
                let view = WorkDayView::of(day, self.timesheet.policy(), now);
                self.publish(LedgerEvent::DayUpdated {
                    day: Box::new(view),
                });
            }
        }

        Ok(decision)
    }

    fn handle_refresh_running(&mut self) {
        let now = self.clock.now();
        let views = self.timesheet.refresh_running(now);
        if views.is_empty() {
            return;
        }

        debug!(count = views.len(), "Refreshed running work days");
        for view in views {
            self.publish(LedgerEvent::DayUpdated {
                day: Box::new(view),
            });
        }
    }

    /// Publishes a timer change on success and converts the result.
    fn publish_entry(&self, result: DomainResult<TaskTimeEntry>) -> Result<TaskTimeEntry, LedgerError> {
        let entry = result?;
        self.publish(LedgerEvent::TaskTimerChanged {
            entry: entry.clone(),
        });
        Ok(entry)
    }

    fn publish(&self, event: LedgerEvent) {
        // No receivers is normal when nobody is subscribed
        if self.event_publisher.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    /// Falls back to today's local date.
    fn resolve_date(&self, date: Option<NaiveDate>) -> NaiveDate {
        date.unwrap_or_else(|| self.timesheet.policy().local_date(self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::oneshot;
    use worktime_core::{DomainError, ManualClock, TaskId, WorkDayStatus};

    fn create_test_actor() -> (LedgerActor, ManualClock, broadcast::Receiver<LedgerEvent>) {
        let (_tx, rx) = mpsc::channel(16);
        let (event_tx, event_rx) = broadcast::channel(16);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
        let actor = LedgerActor::new(
            rx,
            event_tx,
            &LedgerSettings::default(),
            Arc::new(clock.clone()),
        );
        (actor, clock, event_rx)
    }

    #[tokio::test]
    async fn test_start_uses_today_and_publishes() {
        let (mut actor, _clock, mut events) = create_test_actor();
        let (tx, rx) = oneshot::channel();
        actor.handle_command(LedgerCommand::StartDay {
            owner_id: OwnerId::new(1),
            date: None,
            respond_to: tx,
        });

        let view = rx.await.unwrap().unwrap();
        assert_eq!(view.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(view.status, WorkDayStatus::InProgress);

        match events.try_recv().unwrap() {
            LedgerEvent::DayUpdated { day } => assert_eq!(day.owner_id, OwnerId::new(1)),
            other => panic!("Expected DayUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_command_publishes_nothing() {
        let (mut actor, _clock, mut events) = create_test_actor();
        let (tx, rx) = oneshot::channel();
        actor.handle_command(LedgerCommand::PauseDay {
            owner_id: OwnerId::new(1),
            date: None,
            respond_to: tx,
        });

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Domain(DomainError::NoActiveDay { .. })
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refresh_running_publishes_live_totals() {
        let (mut actor, clock, mut events) = create_test_actor();
        let (tx, _rx) = oneshot::channel();
        actor.handle_command(LedgerCommand::StartDay {
            owner_id: OwnerId::new(1),
            date: None,
            respond_to: tx,
        });
        let _ = events.try_recv();

        clock.advance(chrono::Duration::minutes(45));
        actor.handle_command(LedgerCommand::RefreshRunning);

        match events.try_recv().unwrap() {
            LedgerEvent::DayUpdated { day } => assert_eq!(day.net_seconds, 2_700),
            other => panic!("Expected DayUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_task_timer_conflict() {
        let (mut actor, _clock, _events) = create_test_actor();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        actor.handle_command(LedgerCommand::StartTaskTimer {
            user_id: OwnerId::new(1),
            task_id: TaskId::new(5),
            description: None,
            respond_to: tx1,
        });
        actor.handle_command(LedgerCommand::StartTaskTimer {
            user_id: OwnerId::new(2),
            task_id: TaskId::new(5),
            description: None,
            respond_to: tx2,
        });

        let first = rx1.await.unwrap().unwrap();
        let err = rx2.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            LedgerError::Domain(DomainError::Conflict { blocking: first.id })
        );
    }
}
