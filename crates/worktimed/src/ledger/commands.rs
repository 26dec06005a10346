//! Ledger actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `LedgerActor`:
//! - `LedgerCommand`: Commands sent to the actor
//! - `LedgerError`: Errors that can occur during ledger operations
//! - `LedgerEvent`: Events published by the ledger for subscribers

use chrono::NaiveDate;
use thiserror::Error;
use tokio::sync::oneshot;

use worktime_core::{
    DomainError, EntryId, OwnerId, SyncDecision, SyncRequest, TaskId, TaskTimeEntry, WorkDayView,
};

/// Reply channel for commands that return a day view.
pub type DayReply = oneshot::Sender<Result<WorkDayView, LedgerError>>;

/// Reply channel for task timer commands.
pub type EntryReply = oneshot::Sender<Result<TaskTimeEntry, LedgerError>>;

// ============================================================================
// Ledger Commands
// ============================================================================

/// Commands sent to the ledger actor.
///
/// Each command uses a oneshot channel for the response. A `date` of `None`
/// means "today" in the ledger's configured offset.
#[derive(Debug)]
pub enum LedgerCommand {
    /// Start (or continue) a work day.
    ///
    /// # Errors
    /// - `NotWorkDay` if the date has no target
    /// - `AlreadyRunning` if another day of the owner has an open session
    StartDay {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        respond_to: DayReply,
    },

    /// Pause a running day.
    PauseDay {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        respond_to: DayReply,
    },

    /// Resume a paused day.
    ResumeDay {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        respond_to: DayReply,
    },

    /// End a running or paused day.
    EndDay {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        notes: Option<String>,
        respond_to: DayReply,
    },

    /// Restore the open session of an active day, or start it.
    ResumeOrStart {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        respond_to: DayReply,
    },

    /// Read the current view of a day. Never fails.
    DayStatus {
        owner_id: OwnerId,
        date: Option<NaiveDate>,
        respond_to: oneshot::Sender<WorkDayView>,
    },

    /// Reconcile a client's elapsed time.
    Sync {
        request: SyncRequest,
        respond_to: oneshot::Sender<Result<SyncDecision, LedgerError>>,
    },

    /// Start a task timer.
    StartTaskTimer {
        user_id: OwnerId,
        task_id: TaskId,
        description: Option<String>,
        respond_to: EntryReply,
    },

    /// Stop a task timer.
    StopTaskTimer {
        entry_id: EntryId,
        respond_to: EntryReply,
    },

    /// The user's running task timer, if any.
    ActiveTaskTimer {
        user_id: OwnerId,
        respond_to: oneshot::Sender<Option<TaskTimeEntry>>,
    },

    /// All entries of a task plus their total seconds.
    TaskEntries {
        task_id: TaskId,
        respond_to: oneshot::Sender<(Vec<TaskTimeEntry>, u64)>,
    },

    /// Recompute open days and publish their views.
    ///
    /// Fire-and-forget command used by the refresh task.
    RefreshRunning,
}

// ============================================================================
// Ledger Errors
// ============================================================================

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The request was rejected by the domain rules.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

impl LedgerError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(err) => err.code(),
            Self::ChannelClosed => "unavailable",
        }
    }

    /// Returns the domain error, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            Self::ChannelClosed => None,
        }
    }
}

// ============================================================================
// Ledger Events
// ============================================================================

/// Events published by the ledger to subscribers.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    /// A day changed state or had its live totals refreshed.
    DayUpdated { day: Box<WorkDayView> },

    /// A task timer started or stopped.
    TaskTimerChanged { entry: TaskTimeEntry },
}

impl LedgerEvent {
    /// The owner the event concerns, used for subscription filters.
    pub fn owner_id(&self) -> OwnerId {
        match self {
            Self::DayUpdated { day } => day.owner_id,
            Self::TaskTimerChanged { entry } => entry.user_id,
        }
    }
}
