//! Lenient parsing of client sync payloads.
//!
//! Browser and mobile clients report their locally accumulated time in
//! whatever shape their timer widget keeps it: whole seconds, fractional
//! seconds, or a clock string.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use worktime_core::{SyncRequest, WorkDayId};

/// Errors from decoding a sync payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid sync payload: {0}")]
    InvalidPayload(String),

    #[error("invalid elapsed time {0:?}: expected seconds or HH:MM:SS")]
    InvalidElapsed(String),
}

/// Elapsed time as sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawElapsed {
    Seconds(u64),
    Fractional(f64),
    Text(String),
}

impl RawElapsed {
    /// Converts to whole seconds. Fractions are truncated.
    pub fn to_seconds(&self) -> Result<u64, ParseError> {
        match self {
            Self::Seconds(secs) => Ok(*secs),
            Self::Fractional(secs) => {
                if secs.is_finite() && *secs >= 0.0 && *secs < u64::MAX as f64 {
                    Ok(secs.trunc() as u64)
                } else {
                    Err(ParseError::InvalidElapsed(secs.to_string()))
                }
            }
            Self::Text(text) => parse_elapsed(text),
        }
    }
}

/// Parses `"HH:MM:SS"`, `"MM:SS"` or a plain number of seconds.
pub fn parse_elapsed(text: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidElapsed(text.to_string());
    let trimmed = text.trim();

    if !trimmed.contains(':') {
        if let Ok(secs) = trimmed.parse::<u64>() {
            return Ok(secs);
        }
        if !trimmed.contains(['.', 'e', 'E']) {
            return Err(invalid());
        }
        return trimmed
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0 && *secs < u64::MAX as f64)
            .map(|secs| secs.trunc() as u64)
            .ok_or_else(invalid);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return Err(invalid()),
    };

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    hours
        .checked_mul(3_600)
        .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
        .ok_or_else(invalid)
}

/// Raw sync body as received over the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSyncPayload {
    pub work_day_id: u64,
    pub elapsed_seconds: RawElapsed,
    #[serde(default)]
    pub is_running: bool,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl RawSyncPayload {
    /// Decodes a sync payload from a JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ParseError> {
        serde_json::from_value(value).map_err(|e| ParseError::InvalidPayload(e.to_string()))
    }

    /// Converts to the domain request.
    pub fn to_sync_request(&self) -> Result<SyncRequest, ParseError> {
        Ok(SyncRequest {
            work_day_id: WorkDayId::new(self.work_day_id),
            elapsed_seconds: self.elapsed_seconds.to_seconds()?,
            is_running: self.is_running,
            last_sync_at: self.last_sync_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_elapsed_integer() {
        let raw = RawSyncPayload::from_value(json!({
            "work_day_id": 4,
            "elapsed_seconds": 3580,
            "is_running": true
        }))
        .unwrap();
        let request = raw.to_sync_request().unwrap();
        assert_eq!(request.work_day_id, WorkDayId::new(4));
        assert_eq!(request.elapsed_seconds, 3_580);
        assert!(request.is_running);
        assert_eq!(request.last_sync_at, None);
    }

    #[test]
    fn test_elapsed_float_truncates() {
        let raw = RawSyncPayload::from_value(json!({
            "work_day_id": 1,
            "elapsed_seconds": 3599.9
        }))
        .unwrap();
        assert_eq!(raw.to_sync_request().unwrap().elapsed_seconds, 3_599);
    }

    #[test]
    fn test_elapsed_clock_string() {
        let raw = RawSyncPayload::from_value(json!({
            "work_day_id": 1,
            "elapsed_seconds": "01:02:03",
            "last_sync_at": "2024-01-02T09:30:00Z"
        }))
        .unwrap();
        let request = raw.to_sync_request().unwrap();
        assert_eq!(request.elapsed_seconds, 3_723);
        assert!(request.last_sync_at.is_some());
    }

    #[test]
    fn test_parse_elapsed_variants() {
        assert_eq!(parse_elapsed("00:59:59").unwrap(), 3_599);
        assert_eq!(parse_elapsed("12:30").unwrap(), 750);
        assert_eq!(parse_elapsed("  42 ").unwrap(), 42);
        assert_eq!(parse_elapsed("10:00:00").unwrap(), 36_000);
    }

    #[test]
    fn test_parse_elapsed_rejects_garbage() {
        assert!(parse_elapsed("1:2:3:4").is_err());
        assert!(parse_elapsed("01:75:00").is_err());
        assert!(parse_elapsed("soon").is_err());
        assert!(parse_elapsed("-5").is_err());
        assert!(RawElapsed::Fractional(-1.0).to_seconds().is_err());
    }

    #[test]
    fn test_parse_elapsed_overflowing_hours() {
        assert_eq!(
            parse_elapsed("9999999999999999:00:00").unwrap_err(),
            ParseError::InvalidElapsed("9999999999999999:00:00".to_string())
        );
        assert_eq!(parse_elapsed("5124095576030431:00:15").unwrap(), u64::MAX);
    }

    #[test]
    fn test_parse_elapsed_large_integers_are_exact() {
        assert_eq!(
            parse_elapsed("18446744073709551615").unwrap(),
            u64::MAX
        );
        assert_eq!(
            parse_elapsed("9007199254740993").unwrap(),
            9_007_199_254_740_993
        );
        assert!(parse_elapsed("18446744073709551616").is_err());
        assert!(parse_elapsed("1e30").is_err());
        assert_eq!(parse_elapsed("90.5").unwrap(), 90);
    }

    #[test]
    fn test_missing_work_day_id() {
        let err = RawSyncPayload::from_value(json!({"elapsed_seconds": 5})).unwrap_err();
        assert!(matches!(err, ParseError::InvalidPayload(_)));
    }
}
