//! Worktime Core - Domain types for work-day time tracking
//!
//! This crate holds the pure accounting engine shared by the daemon
//! (worktimed) and the command-line client (worktime): session logs and
//! their recompute, the work-day state machine, daily targets, the
//! single-active-timer guard, task timers and client reconciliation.
//!
//! Nothing here performs I/O or reads the wall clock; "now" is always passed
//! in, usually from a [`Clock`].
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod clock;
pub mod error;
pub mod guard;
pub mod ids;
pub mod schedule;
pub mod session;
pub mod sync;
pub mod task_timer;
pub mod timesheet;
pub mod view;
pub mod workday;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult, ErrorClass};
pub use guard::{ActiveTimerGuard, TimerScope};
pub use ids::{EntryId, OwnerId, TaskId, WorkDayId};
pub use schedule::{is_work_day, target_seconds, DailyTargetPolicy, WorkingHours};
pub use session::{format_seconds, Session, SessionKind, SessionLog, Totals};
pub use sync::{Authority, SyncDecision, SyncRequest, DEFAULT_DRIFT_THRESHOLD_SECS};
pub use task_timer::{TaskTimeEntry, TaskTimers};
pub use timesheet::Timesheet;
pub use view::WorkDayView;
pub use workday::{EndReport, StartOutcome, WorkDay, WorkDayStatus};
