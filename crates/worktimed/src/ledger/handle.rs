//! Client interface for interacting with the LedgerActor.
//!
//! The `LedgerHandle` is cheap to clone and is what the connection handlers,
//! the refresh task and in-process callers use to reach the actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `LedgerError::ChannelClosed`

use chrono::NaiveDate;
use tokio::sync::{broadcast, mpsc, oneshot};

use worktime_core::{
    EntryId, OwnerId, SyncDecision, SyncRequest, TaskId, TaskTimeEntry, WorkDayView,
};

use super::commands::{LedgerCommand, LedgerError, LedgerEvent};

// ============================================================================
// Ledger Handle
// ============================================================================

/// Handle for interacting with the ledger actor.
///
/// ```ignore
/// let view = handle.start_day(owner, None).await?;
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct LedgerHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<LedgerCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<LedgerEvent>,
}

impl LedgerHandle {
    pub fn new(
        sender: mpsc::Sender<LedgerCommand>,
        event_sender: broadcast::Sender<LedgerEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends a command built around a fresh reply channel and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerCommand,
    ) -> Result<T, LedgerError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| LedgerError::ChannelClosed)?;

        rx.await.map_err(|_| LedgerError::ChannelClosed)
    }

    /// Start (or continue) the owner's day.
    ///
    /// # Errors
    ///
    /// - `NotWorkDay` if the date has no target
    /// - `AlreadyRunning` if another day of the owner is running
    /// - `LedgerError::ChannelClosed` if the actor has shut down
    pub async fn start_day(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::StartDay {
            owner_id,
            date,
            respond_to,
        })
        .await?
    }

    /// Pause a running day.
    ///
    /// # Errors
    ///
    /// - `NoActiveDay` if the day is not in progress
    pub async fn pause_day(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::PauseDay {
            owner_id,
            date,
            respond_to,
        })
        .await?
    }

    /// Resume a paused day.
    ///
    /// # Errors
    ///
    /// - `NotPaused` if the day is not paused
    pub async fn resume_day(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::ResumeDay {
            owner_id,
            date,
            respond_to,
        })
        .await?
    }

    /// End the day, optionally attaching notes.
    ///
    /// # Errors
    ///
    /// - `AlreadyCompleted` if the day was already ended
    /// - `NoActiveDay` if the day was never started
    pub async fn end_day(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        notes: Option<String>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::EndDay {
            owner_id,
            date,
            notes,
            respond_to,
        })
        .await?
    }

    /// Restore the open session of an active day, or start the day.
    pub async fn resume_or_start(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::ResumeOrStart {
            owner_id,
            date,
            respond_to,
        })
        .await?
    }

    /// Current view of the owner's day.
    ///
    /// Only fails if the actor is gone.
    pub async fn day_status(
        &self,
        owner_id: OwnerId,
        date: Option<NaiveDate>,
    ) -> Result<WorkDayView, LedgerError> {
        self.request(|respond_to| LedgerCommand::DayStatus {
            owner_id,
            date,
            respond_to,
        })
        .await
    }

    /// Reconcile a client's elapsed time.
    ///
    /// # Errors
    ///
    /// - `WorkDayNotFound` if the id is unknown
    pub async fn sync(&self, request: SyncRequest) -> Result<SyncDecision, LedgerError> {
        self.request(|respond_to| LedgerCommand::Sync {
            request,
            respond_to,
        })
        .await?
    }

    /// Start a task timer.
    ///
    /// # Errors
    ///
    /// - `Conflict` carrying the blocking entry id
    pub async fn start_task_timer(
        &self,
        user_id: OwnerId,
        task_id: TaskId,
        description: Option<String>,
    ) -> Result<TaskTimeEntry, LedgerError> {
        self.request(|respond_to| LedgerCommand::StartTaskTimer {
            user_id,
            task_id,
            description,
            respond_to,
        })
        .await?
    }

    /// Stop a task timer.
    ///
    /// # Errors
    ///
    /// - `NotRunning` if it was already stopped
    /// - `EntryNotFound` if the id is unknown
    pub async fn stop_task_timer(&self, entry_id: EntryId) -> Result<TaskTimeEntry, LedgerError> {
        self.request(|respond_to| LedgerCommand::StopTaskTimer {
            entry_id,
            respond_to,
        })
        .await?
    }

    /// The user's running task timer.
    pub async fn active_task_timer(
        &self,
        user_id: OwnerId,
    ) -> Result<Option<TaskTimeEntry>, LedgerError> {
        self.request(|respond_to| LedgerCommand::ActiveTaskTimer {
            user_id,
            respond_to,
        })
        .await
    }

    /// All entries of a task and their total seconds.
    pub async fn task_entries(
        &self,
        task_id: TaskId,
    ) -> Result<(Vec<TaskTimeEntry>, u64), LedgerError> {
        self.request(|respond_to| LedgerCommand::TaskEntries {
            task_id,
            respond_to,
        })
        .await
    }

    /// Trigger a refresh of running days.
    pub async fn refresh_running(&self) {
        // Fire-and-forget: ignore send errors (actor may be shutting down)
        let _ = self.sender.send(LedgerCommand::RefreshRunning).await;
    }

    /// Subscribe to ledger events.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.event_sender.subscribe()
    }

    /// Returns `true` while the command channel is open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
