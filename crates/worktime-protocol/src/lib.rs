//! Worktime Protocol - Wire protocol for daemon communication
//!
//! This crate provides message types and parsing for communication
//! between the `worktime` client (or any other frontend) and the
//! `worktimed` daemon.

pub mod message;
pub mod parse;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, MessageType};
pub use parse::{parse_elapsed, ParseError, RawElapsed, RawSyncPayload};
pub use version::ProtocolVersion;
