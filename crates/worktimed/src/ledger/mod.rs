//! Time ledger using the Actor pattern.
//!
//! The ledger owns every work day and task timer. It receives commands via a
//! tokio mpsc channel, applies them one at a time, and broadcasts the
//! resulting changes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Socket clients  │────▶│   LedgerActor   │────▶│ Broadcast Channel│
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                       │                       │
//!         │   LedgerCommand       │   LedgerEvent         │
//!         │   (mpsc channel)      │   (broadcast)         │
//!         ▼                       ▼                       ▼
//!   start/pause/end         Timesheet +             Subscribed clients
//!   timers, sync            TaskTimers              receive updates
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::debug;

use worktime_core::{Clock, DailyTargetPolicy, DEFAULT_DRIFT_THRESHOLD_SECS};

mod actor;
mod commands;
mod handle;

pub use actor::LedgerActor;
pub use commands::{DayReply, EntryReply, LedgerCommand, LedgerError, LedgerEvent};
pub use handle::LedgerHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Default interval between live refreshes of running days.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Tunables of the ledger.
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub policy: DailyTargetPolicy,
    pub drift_threshold_secs: u64,
    /// `None` disables the refresh task.
    pub refresh_interval: Option<Duration>,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            policy: DailyTargetPolicy::default(),
            drift_threshold_secs: DEFAULT_DRIFT_THRESHOLD_SECS,
            refresh_interval: Some(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)),
        }
    }
}

/// Spawn the ledger actor and return a handle for interaction.
///
/// This function:
/// 1. Creates command and event channels
/// 2. Spawns the LedgerActor on a tokio task
/// 3. Spawns the background refresh task, if enabled
/// 4. Returns a LedgerHandle for client use
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use worktime_core::{OwnerId, SystemClock};
/// use worktimed::ledger::{spawn_ledger, LedgerSettings};
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_ledger(LedgerSettings::default(), Arc::new(SystemClock));
///     let today = handle.day_status(OwnerId::new(1), None).await;
/// }
/// ```
pub fn spawn_ledger(settings: LedgerSettings, clock: Arc<dyn Clock>) -> LedgerHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = LedgerActor::new(cmd_rx, event_tx.clone(), &settings, clock);
    tokio::spawn(actor.run());

    let handle = LedgerHandle::new(cmd_tx.clone(), event_tx);

    if let Some(period) = settings.refresh_interval {
        spawn_refresh_task(cmd_tx.downgrade(), period);
    }

    handle
}

/// Spawn a background task that periodically refreshes running days.
///
/// Holds only a weak sender so the actor still stops once every handle is
/// dropped.
fn spawn_refresh_task(sender: mpsc::WeakSender<LedgerCommand>, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(sender) = sender.upgrade() else {
                debug!("Refresh task stopping: all ledger handles dropped");
                break;
            };

            // Fire-and-forget refresh command
            if sender.send(LedgerCommand::RefreshRunning).await.is_err() {
                debug!("Refresh task stopping: ledger channel closed");
                break;
            }
        }
    });
}
