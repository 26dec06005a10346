//! Domain error taxonomy following the panic-free policy.
//!
//! None of these are fatal: every variant is turned into a decision for the
//! caller at the boundary. Only I/O in the daemon is allowed to fail hard.

use chrono::NaiveDate;
use thiserror::Error;

use crate::{EntryId, OwnerId, WorkDayId};

/// How a caller should treat a [`DomainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The action is never allowed in this situation (e.g. working on Sunday).
    Forbidden,
    /// The current state does not admit the action; the caller may resolve it.
    Conflict,
    /// The referenced record does not exist.
    NotFound,
    /// Stored data violated an invariant and was clamped.
    Integrity,
}

/// Errors that can occur in time-tracking operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Start attempted on a day whose target is zero.
    #[error("{date} is not a work day")]
    NotWorkDay { date: NaiveDate },

    /// Another work day of the same owner still has an open session.
    #[error("{owner_id} already has a running work day ({blocking})")]
    AlreadyRunning {
        owner_id: OwnerId,
        blocking: WorkDayId,
    },

    /// End requested on a day that is already completed.
    #[error("work day {date} for {owner_id} is already completed; start again to continue")]
    AlreadyCompleted { owner_id: OwnerId, date: NaiveDate },

    /// The action needs an active (started, not completed) day.
    #[error("no active work day on {date} for {owner_id}")]
    NoActiveDay { owner_id: OwnerId, date: NaiveDate },

    /// Resume requested on a day that is not paused.
    #[error("work day {date} for {owner_id} is not paused")]
    NotPaused { owner_id: OwnerId, date: NaiveDate },

    /// A timer is already open for this scope.
    #[error("a timer is already running ({blocking}); stop it first")]
    Conflict { blocking: EntryId },

    /// Stop requested on a timer entry that has already ended.
    #[error("timer entry {entry_id} is not running")]
    NotRunning { entry_id: EntryId },

    /// Unknown work-day id.
    #[error("work day not found: {0}")]
    WorkDayNotFound(WorkDayId),

    /// Unknown timer entry id.
    #[error("timer entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Stored data violated an invariant.
    #[error("data integrity: {0}")]
    DataIntegrity(String),
}

impl DomainError {
    /// Returns the class used to pick a response for the caller.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotWorkDay { .. } => ErrorClass::Forbidden,
            Self::AlreadyRunning { .. }
            | Self::AlreadyCompleted { .. }
            | Self::NoActiveDay { .. }
            | Self::NotPaused { .. }
            | Self::Conflict { .. }
            | Self::NotRunning { .. } => ErrorClass::Conflict,
            Self::WorkDayNotFound(_) | Self::EntryNotFound(_) => ErrorClass::NotFound,
            Self::DataIntegrity(_) => ErrorClass::Integrity,
        }
    }

    /// Stable machine-readable code, used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotWorkDay { .. } => "not_work_day",
            Self::AlreadyRunning { .. } => "already_running",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::NoActiveDay { .. } => "no_active_day",
            Self::NotPaused { .. } => "not_paused",
            Self::Conflict { .. } => "conflict",
            Self::NotRunning { .. } => "not_running",
            Self::WorkDayNotFound(_) => "work_day_not_found",
            Self::EntryNotFound(_) => "entry_not_found",
            Self::DataIntegrity(_) => "data_integrity",
        }
    }

    /// Returns the id of the record blocking the action, if any.
    pub fn blocking_id(&self) -> Option<u64> {
        match self {
            Self::AlreadyRunning { blocking, .. } => Some(blocking.get()),
            Self::Conflict { blocking } => Some(blocking.get()),
            _ => None,
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
