//! Reconciliation of client-side elapsed time against the server log.
//!
//! The server recompute is always authoritative for stored totals. A client
//! within the drift threshold may only flag the day as running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workday::WorkDayStatus;
use crate::WorkDayId;

/// Drift above which the client value is discarded.
pub const DEFAULT_DRIFT_THRESHOLD_SECS: u64 = 300;

/// What a client believes about a work day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub work_day_id: WorkDayId,
    pub elapsed_seconds: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Whose value the client should display after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Server,
    Client,
}

/// Outcome of one sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDecision {
    pub work_day_id: WorkDayId,
    pub server_seconds: u64,
    pub client_seconds: u64,
    pub drift: u64,
    pub authoritative: Authority,
    /// Status after the sync.
    pub status: WorkDayStatus,
    /// True if the sync flipped the day back to in progress.
    pub status_healed: bool,
}

/// Compares the two readings and picks an authority.
///
/// Drift equal to the threshold is still accepted.
pub fn assess(server_seconds: u64, client_seconds: u64, threshold: u64) -> (u64, Authority) {
    let drift = server_seconds.abs_diff(client_seconds);
    let authority = if drift > threshold {
        Authority::Server
    } else {
        Authority::Client
    };
    (drift, authority)
}
