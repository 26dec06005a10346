//! Session log: typed work/pause intervals and the recompute of day totals.
//!
//! Totals are always derived from the log. Cached fields on a work day are a
//! snapshot of [`SessionLog::recompute`], never a source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::{DomainError, DomainResult};

// ============================================================================
// Session Kind
// ============================================================================

/// What an interval counts towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Counts towards net worked time.
    Work,
    /// Counts towards pause time.
    Pause,
}

impl SessionKind {
    /// Returns the display label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Pause => "pause",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Session
// ============================================================================

/// One contiguous interval of a work day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub kind: SessionKind,
    pub start: DateTime<Utc>,
    /// `None` while the interval is still running.
    pub end: Option<DateTime<Utc>>,
}

impl Session {
    /// Opens a new interval at `start`.
    pub fn open(kind: SessionKind, start: DateTime<Utc>) -> Self {
        Self {
            kind,
            start,
            end: None,
        }
    }

    /// Returns true if the interval has no end yet.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration in whole seconds, using `now` as the provisional end of an
    /// open interval. Negative spans clamp to zero.
    pub fn duration_seconds(&self, now: DateTime<Utc>) -> u64 {
        let end = self.end.unwrap_or(now);
        let secs = end.signed_duration_since(self.start).num_seconds();
        u64::try_from(secs).unwrap_or(0)
    }

    /// Returns true if the recorded end lies before the start.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.end.is_some_and(|end| end < self.start)
    }
}

// ============================================================================
// Totals
// ============================================================================

/// Recomputed totals of a session log.
///
/// `total` is always `net + pause`; the fields are private so the sum cannot
/// drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    net: u64,
    pause: u64,
}

impl Totals {
    /// Creates totals from work and pause seconds.
    pub fn new(net: u64, pause: u64) -> Self {
        Self { net, pause }
    }

    /// Seconds of work.
    pub fn net_seconds(&self) -> u64 {
        self.net
    }

    /// Seconds of pause.
    pub fn pause_seconds(&self) -> u64 {
        self.pause
    }

    /// Work plus pause.
    pub fn total_seconds(&self) -> u64 {
        self.net.saturating_add(self.pause)
    }

    fn add(&mut self, kind: SessionKind, seconds: u64) {
        match kind {
            SessionKind::Work => self.net = self.net.saturating_add(seconds),
            SessionKind::Pause => self.pause = self.pause.saturating_add(seconds),
        }
    }
}

// ============================================================================
// Session Log
// ============================================================================

/// Ordered intervals of one work day. At most one interval is open.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionLog {
    sessions: Vec<Session>,
}

impl SessionLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all intervals in insertion order.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Returns the number of intervals.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Returns the currently running interval.
    pub fn open_session(&self) -> Option<&Session> {
        self.sessions.iter().rev().find(|s| s.is_open())
    }

    /// Returns the number of open intervals (0 or 1 when the invariant holds).
    pub fn open_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_open()).count()
    }

    /// Opens a new interval of `kind` at `at`.
    ///
    /// Refuses if another interval is still open.
    pub fn open(&mut self, kind: SessionKind, at: DateTime<Utc>) -> DomainResult<()> {
        if let Some(open) = self.open_session() {
            return Err(DomainError::DataIntegrity(format!(
                "cannot open {kind} session: {} session since {} is still open",
                open.kind,
                open.start.to_rfc3339()
            )));
        }
        self.sessions.push(Session::open(kind, at));
        Ok(())
    }

    /// Closes every open interval at `at` and returns the kind of the last
    /// one closed.
    ///
    /// An end earlier than the start (clock skew) is pinned to the start so
    /// the interval counts zero seconds.
    pub fn close_open(&mut self, at: DateTime<Utc>) -> Option<SessionKind> {
        let mut closed = None;
        for session in self.sessions.iter_mut().filter(|s| s.is_open()) {
            if at < session.start {
                warn!(
                    kind = %session.kind,
                    start = %session.start,
                    end = %at,
                    "Clock went backwards while closing session, clamping to zero"
                );
            }
            session.end = Some(at.max(session.start));
            closed = Some(session.kind);
        }
        closed
    }

    /// Recomputes work and pause totals with `now` as the provisional end of
    /// the open interval.
    ///
    /// Pure with respect to the log: calling it twice with the same `now`
    /// yields the same result, and while an interval is open the result never
    /// decreases as `now` grows.
    pub fn recompute(&self, now: DateTime<Utc>) -> Totals {
        let mut totals = Totals::default();
        for session in &self.sessions {
            if session.is_inverted() {
                warn!(
                    kind = %session.kind,
                    start = %session.start,
                    end = ?session.end,
                    "Session ends before it starts, counting zero seconds"
                );
            }
            totals.add(session.kind, session.duration_seconds(now));
        }
        totals
    }
}

/// Formats seconds for display.
///
/// Returns format like "35s", "2m 15s", "7h 30m".
pub fn format_seconds(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining_secs = secs % 60;
        if remaining_secs == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m {remaining_secs}s")
        }
    } else {
        let hours = secs / 3600;
        let remaining_mins = (secs % 3600) / 60;
        if remaining_mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {remaining_mins}m")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, h, m, 0).unwrap()
    }

    fn tuesday_log() -> SessionLog {
        let mut log = SessionLog::new();
        log.open(SessionKind::Work, at(9, 0)).unwrap();
        log.close_open(at(12, 0));
        log.open(SessionKind::Pause, at(12, 0)).unwrap();
        log.close_open(at(13, 0));
        log.open(SessionKind::Work, at(13, 0)).unwrap();
        log
    }

    #[test]
    fn test_recompute_closed_and_open_sessions() {
        let log = tuesday_log();
        let totals = log.recompute(at(17, 30));
        assert_eq!(totals.net_seconds(), 3 * 3600 + 4 * 3600 + 1800);
        assert_eq!(totals.pause_seconds(), 3600);
        assert_eq!(
            totals.total_seconds(),
            totals.net_seconds() + totals.pause_seconds()
        );
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let log = tuesday_log();
        let now = at(15, 0);
        assert_eq!(log.recompute(now), log.recompute(now));
    }

    #[test]
    fn test_recompute_monotonic_while_open() {
        let log = tuesday_log();
        let mut previous = log.recompute(at(13, 0)).net_seconds();
        for minutes in (5..=300).step_by(5) {
            let now = at(13, 0) + Duration::minutes(minutes);
            let net = log.recompute(now).net_seconds();
            assert!(net >= previous);
            previous = net;
        }
    }

    #[test]
    fn test_recompute_does_not_persist_provisional_end() {
        let log = tuesday_log();
        let _ = log.recompute(at(17, 0));
        assert!(log.open_session().is_some());
        assert_eq!(log.open_count(), 1);
    }

    #[test]
    fn test_inverted_session_clamps_to_zero() {
        let log = SessionLog {
            sessions: vec![Session {
                kind: SessionKind::Work,
                start: at(10, 0),
                end: Some(at(9, 0)),
            }],
        };
        let totals = log.recompute(at(11, 0));
        assert_eq!(totals.net_seconds(), 0);
        assert_eq!(totals.total_seconds(), 0);
    }

    #[test]
    fn test_open_refuses_second_open_session() {
        let mut log = SessionLog::new();
        log.open(SessionKind::Work, at(9, 0)).unwrap();
        let err = log.open(SessionKind::Pause, at(10, 0)).unwrap_err();
        assert!(matches!(err, DomainError::DataIntegrity(_)));
        assert_eq!(log.open_count(), 1);
    }

    #[test]
    fn test_close_with_earlier_clock_clamps() {
        let mut log = SessionLog::new();
        log.open(SessionKind::Work, at(9, 0)).unwrap();
        assert_eq!(log.close_open(at(8, 0)), Some(SessionKind::Work));
        let session = log.sessions().first().unwrap();
        assert_eq!(session.end, Some(at(9, 0)));
        assert_eq!(log.recompute(at(10, 0)).net_seconds(), 0);
    }

    #[test]
    fn test_open_session_in_future_counts_zero() {
        let mut log = SessionLog::new();
        log.open(SessionKind::Work, at(12, 0)).unwrap();
        assert_eq!(log.recompute(at(11, 0)).net_seconds(), 0);
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(35), "35s");
        assert_eq!(format_seconds(135), "2m 15s");
        assert_eq!(format_seconds(27_000), "7h 30m");
        assert_eq!(format_seconds(28_800), "8h");
    }
}
