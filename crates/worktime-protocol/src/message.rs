//! Protocol message types for daemon communication.

use crate::version::ProtocolVersion;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use worktime_core::{
    DomainError, EntryId, OwnerId, SyncDecision, TaskId, TaskTimeEntry, WorkDayView,
};

/// Message types that can be sent by clients to the daemon.
///
/// Day commands take an optional `date`; the daemon uses its local "today"
/// when it is absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Client handshake/connection request
    Connect {
        #[serde(skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    StartDay {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    PauseDay {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    ResumeDay {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    EndDay {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
    },

    /// Restore the open session of an active day, or start it
    ResumeOrStart {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    DayStatus {
        owner_id: OwnerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date: Option<NaiveDate>,
    },

    /// Client elapsed-time report
    Sync {
        /// The raw sync JSON (to be parsed)
        data: serde_json::Value,
    },

    StartTaskTimer {
        user_id: OwnerId,
        task_id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },

    StopTaskTimer { entry_id: EntryId },

    ActiveTaskTimer { user_id: OwnerId },

    TaskEntries { task_id: TaskId },

    /// Subscribe to day and timer updates
    Subscribe {
        /// Optional filter by owner
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner_id: Option<OwnerId>,
    },

    /// Unsubscribe from updates
    Unsubscribe,

    /// Ping to check connection
    Ping {
        /// Sequence number for matching pong response
        seq: u64,
    },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Messages sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn start_day(owner_id: OwnerId, date: Option<NaiveDate>) -> Self {
        Self::new(MessageType::StartDay { owner_id, date })
    }

    pub fn pause_day(owner_id: OwnerId, date: Option<NaiveDate>) -> Self {
        Self::new(MessageType::PauseDay { owner_id, date })
    }

    pub fn resume_day(owner_id: OwnerId, date: Option<NaiveDate>) -> Self {
        Self::new(MessageType::ResumeDay { owner_id, date })
    }

    pub fn end_day(owner_id: OwnerId, date: Option<NaiveDate>, notes: Option<String>) -> Self {
        Self::new(MessageType::EndDay {
            owner_id,
            date,
            notes,
        })
    }

    pub fn resume_or_start(owner_id: OwnerId, date: Option<NaiveDate>) -> Self {
        Self::new(MessageType::ResumeOrStart { owner_id, date })
    }

    pub fn day_status(owner_id: OwnerId, date: Option<NaiveDate>) -> Self {
        Self::new(MessageType::DayStatus { owner_id, date })
    }

    pub fn sync(data: serde_json::Value) -> Self {
        Self::new(MessageType::Sync { data })
    }

    pub fn start_task_timer(user_id: OwnerId, task_id: TaskId, description: Option<String>) -> Self {
        Self::new(MessageType::StartTaskTimer {
            user_id,
            task_id,
            description,
        })
    }

    pub fn stop_task_timer(entry_id: EntryId) -> Self {
        Self::new(MessageType::StopTaskTimer { entry_id })
    }

    pub fn active_task_timer(user_id: OwnerId) -> Self {
        Self::new(MessageType::ActiveTaskTimer { user_id })
    }

    pub fn task_entries(task_id: TaskId) -> Self {
        Self::new(MessageType::TaskEntries { task_id })
    }

    pub fn subscribe(owner_id: Option<OwnerId>) -> Self {
        Self::new(MessageType::Subscribe { owner_id })
    }

    pub fn unsubscribe() -> Self {
        Self::new(MessageType::Unsubscribe)
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

/// Messages sent from daemon to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Connection accepted
    Connected {
        protocol_version: ProtocolVersion,
        client_id: String,
    },

    /// Connection rejected (version mismatch, etc.)
    Rejected {
        reason: String,
        /// Daemon's protocol version (for client to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Reply to a day command or status request
    WorkDay { day: Box<WorkDayView> },

    /// Reply to a sync
    SyncResult { decision: SyncDecision },

    /// Reply to a task timer command; `None` when no timer is running
    TaskEntry { entry: Option<TaskTimeEntry> },

    /// All entries of a task with their accumulated time
    TaskEntries {
        task_id: TaskId,
        entries: Vec<TaskTimeEntry>,
        total_seconds: u64,
    },

    /// Subscription accepted; carries the owner's current day when filtered
    Subscribed {
        #[serde(skip_serializing_if = "Option::is_none")]
        owner_id: Option<OwnerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        day: Option<Box<WorkDayView>>,
    },

    /// Pushed to subscribers when a day changes or is refreshed
    DayUpdated { day: Box<WorkDayView> },

    /// Pushed to subscribers when a task timer starts or stops
    TaskTimerChanged { entry: TaskTimeEntry },

    /// Pong response to ping
    Pong { seq: u64 },

    /// Error response
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Id of the record blocking the request (running day or timer)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocking_id: Option<u64>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn work_day(day: WorkDayView) -> Self {
        Self::WorkDay { day: Box::new(day) }
    }

    pub fn sync_result(decision: SyncDecision) -> Self {
        Self::SyncResult { decision }
    }

    pub fn task_entry(entry: Option<TaskTimeEntry>) -> Self {
        Self::TaskEntry { entry }
    }

    pub fn task_entries(task_id: TaskId, entries: Vec<TaskTimeEntry>, total_seconds: u64) -> Self {
        Self::TaskEntries {
            task_id,
            entries,
            total_seconds,
        }
    }

    pub fn subscribed(owner_id: Option<OwnerId>, day: Option<WorkDayView>) -> Self {
        Self::Subscribed {
            owner_id,
            day: day.map(Box::new),
        }
    }

    pub fn day_updated(day: WorkDayView) -> Self {
        Self::DayUpdated { day: Box::new(day) }
    }

    pub fn task_timer_changed(entry: TaskTimeEntry) -> Self {
        Self::TaskTimerChanged { entry }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    /// Creates an error response without a code.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
            blocking_id: None,
        }
    }

    /// Creates an error response with code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
            blocking_id: None,
        }
    }

    /// Maps a domain error onto an error response.
    pub fn domain_error(err: &DomainError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: Some(err.code().to_string()),
            blocking_id: err.blocking_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_serialization() {
        let msg = ClientMessage::start_day(OwnerId::new(7), None);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"start_day\""));
        assert!(json.contains("\"owner_id\":7"));
        assert!(!json.contains("date"));
    }

    #[test]
    fn test_day_command_with_date() {
        let json = r#"{
            "protocol_version": {"major": 1, "minor": 0},
            "type": "end_day",
            "owner_id": 3,
            "date": "2024-01-02",
            "notes": "shipped"
        }"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        match parsed.message {
            MessageType::EndDay {
                owner_id,
                date,
                notes,
            } => {
                assert_eq!(owner_id, OwnerId::new(3));
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 1, 2));
                assert_eq!(notes.as_deref(), Some("shipped"));
            }
            other => panic!("Expected EndDay message, got {other:?}"),
        }
    }

    #[test]
    fn test_subscribe_filter() {
        let json = serde_json::to_string(&ClientMessage::subscribe(Some(OwnerId::new(5)))).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        match parsed.message {
            MessageType::Subscribe { owner_id } => assert_eq!(owner_id, Some(OwnerId::new(5))),
            other => panic!("Expected Subscribe message, got {other:?}"),
        }
    }

    #[test]
    fn test_domain_error_carries_code_and_blocking_id() {
        let err = DomainError::Conflict {
            blocking: EntryId::new(12),
        };
        let json = serde_json::to_value(DaemonMessage::domain_error(&err)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "conflict");
        assert_eq!(json["blocking_id"], 12);
    }

    #[test]
    fn test_plain_error_omits_optional_fields() {
        let json = serde_json::to_string(&DaemonMessage::error("boom")).unwrap();
        assert!(!json.contains("code"));
        assert!(!json.contains("blocking_id"));
    }

    #[test]
    fn test_connected_serialization() {
        let msg = DaemonMessage::connected("client-123".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"client_id\":\"client-123\""));
    }

    #[test]
    fn test_unfiltered_subscribed_omits_owner_and_day() {
        let json = serde_json::to_string(&DaemonMessage::subscribed(None, None)).unwrap();
        assert_eq!(json, "{\"type\":\"subscribed\"}");
    }
}
