//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Parses incoming messages
//! - Routes commands to the ledger
//! - Sends replies, and pushes events once subscribed
//!
//! Domain rejections (not a work day, timer conflict, ...) are answered with
//! an `error` message carrying a code; the connection stays open.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use worktime_core::OwnerId;
use worktime_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion, RawSyncPayload};

use super::insert_subscriber;
use crate::ledger::{LedgerError, LedgerHandle};

/// Type alias for subscriber writer handle
pub type SubscriberWriter = Arc<Mutex<BufWriter<OwnedWriteHalf>>>;

/// Information about a subscribed client
pub struct Subscriber {
    /// Writer for sending events
    pub writer: SubscriberWriter,

    /// Only events about this owner are sent (None = all owners)
    pub filter: Option<OwnerId>,
}

impl Subscriber {
    /// Returns true if events about `owner_id` pass the filter.
    pub fn accepts(&self, owner_id: OwnerId) -> bool {
        self.filter.map_or(true, |filter| filter == owner_id)
    }
}

/// Type alias for the subscribers map
pub type SubscribersMap = Arc<RwLock<HashMap<String, Subscriber>>>;

/// Maximum message size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Unique identifier for this connection
type ClientId = String;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    /// Buffered reader for incoming messages
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer for outgoing messages (shared for event broadcast)
    writer: SubscriberWriter,

    /// Handle to the time ledger
    ledger: LedgerHandle,

    /// Shared subscribers map for event broadcasting
    subscribers: SubscribersMap,

    /// Unique client identifier (assigned after handshake)
    client_id: Option<ClientId>,

    /// Whether this client is subscribed to events
    subscribed: bool,

    /// Counter for generating client IDs
    connection_number: u64,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - Read half of the Unix stream
    /// * `writer` - Write half of the Unix stream
    /// * `ledger` - Handle to the time ledger
    /// * `subscribers` - Shared map of event subscribers
    /// * `connection_number` - Unique number for this connection
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        ledger: LedgerHandle,
        subscribers: SubscribersMap,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            ledger,
            subscribers,
            client_id: None,
            subscribed: false,
            connection_number,
        }
    }

    /// Runs the connection handler.
    ///
    /// Performs the handshake, then processes messages until the connection
    /// closes. Returns the client id so the server can drop its subscription.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        match self.handle_handshake().await {
            Ok(()) => {
                info!(client_id = ?self.client_id, "Client handshake completed");
            }
            Err(e) => {
                warn!(
                    connection = self.connection_number,
                    error = %e,
                    "Handshake failed"
                );
                return None;
            }
        }

        let client_id = self.client_id.clone();

        if let Err(e) = self.process_messages().await {
            debug!(
                client_id = ?self.client_id,
                error = %e,
                "Connection closed"
            );
        }

        info!(client_id = ?self.client_id, "Client disconnected");
        client_id
    }

    /// Expects a `Connect` message with a compatible protocol version and
    /// answers `Connected` or `Rejected`.
    async fn handle_handshake(&mut self) -> Result<(), ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if let Err(e) = ProtocolVersion::CURRENT.check(&client_version) {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );

            self.send_message(DaemonMessage::rejected(&e.to_string()))
                .await?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned_id =
                    client_id.unwrap_or_else(|| format!("client-{}", self.connection_number));

                self.client_id = Some(assigned_id.clone());
                self.send_message(DaemonMessage::connected(assigned_id))
                    .await?;

                Ok(())
            }
            other => {
                self.send_message(DaemonMessage::error_with_code(
                    "Expected Connect message for handshake",
                    "handshake_required",
                ))
                .await?;

                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    /// Main message processing loop.
    ///
    /// Malformed lines are answered with an error and skipped; I/O failures,
    /// EOF and idle timeouts end the loop.
    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => {
                    debug!(client_id = ?self.client_id, "Client sent EOF");
                    return Ok(());
                }
                Ok(Err(e @ (ConnectionError::ParseError(_) | ConnectionError::MessageTooLarge { .. }))) => {
                    debug!(client_id = ?self.client_id, error = %e, "Rejected client message");
                    self.send_message(DaemonMessage::error_with_code(
                        &e.to_string(),
                        "invalid_message",
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!(client_id = ?self.client_id, "Connection timed out");
                    return Err(ConnectionError::Timeout);
                }
            };

            match self.handle_message(msg).await {
                Ok(()) => {}
                Err(ConnectionError::Eof) => return Ok(()),
                Err(e) => {
                    error!(
                        client_id = ?self.client_id,
                        error = %e,
                        "Error handling message"
                    );

                    // Send error response but continue processing
                    let _ = self
                        .send_message(DaemonMessage::error(&e.to_string()))
                        .await;
                }
            }
        }
    }

    /// Handles a single client message.
    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let reply = match msg.message {
            MessageType::Connect { .. } => DaemonMessage::error("Already connected"),

            MessageType::StartDay { owner_id, date } => {
                day_reply(self.ledger.start_day(owner_id, date).await)?
            }
            MessageType::PauseDay { owner_id, date } => {
                day_reply(self.ledger.pause_day(owner_id, date).await)?
            }
            MessageType::ResumeDay { owner_id, date } => {
                day_reply(self.ledger.resume_day(owner_id, date).await)?
            }
            MessageType::EndDay {
                owner_id,
                date,
                notes,
            } => day_reply(self.ledger.end_day(owner_id, date, notes).await)?,
            MessageType::ResumeOrStart { owner_id, date } => {
                day_reply(self.ledger.resume_or_start(owner_id, date).await)?
            }
            MessageType::DayStatus { owner_id, date } => {
                day_reply(self.ledger.day_status(owner_id, date).await)?
            }

            MessageType::Sync { data } => self.handle_sync(data).await?,

            MessageType::StartTaskTimer {
                user_id,
                task_id,
                description,
            } => entry_reply(
                self.ledger
                    .start_task_timer(user_id, task_id, description)
                    .await,
            )?,
            MessageType::StopTaskTimer { entry_id } => {
                entry_reply(self.ledger.stop_task_timer(entry_id).await)?
            }
            MessageType::ActiveTaskTimer { user_id } => {
                let entry = self
                    .ledger
                    .active_task_timer(user_id)
                    .await
                    .map_err(ConnectionError::from)?;
                DaemonMessage::task_entry(entry)
            }
            MessageType::TaskEntries { task_id } => {
                let (entries, total) = self
                    .ledger
                    .task_entries(task_id)
                    .await
                    .map_err(ConnectionError::from)?;
                DaemonMessage::task_entries(task_id, entries, total)
            }

            MessageType::Subscribe { owner_id } => self.handle_subscribe(owner_id).await?,

            MessageType::Unsubscribe => {
                if let Some(ref client_id) = self.client_id {
                    let mut subs = self.subscribers.write().await;
                    subs.remove(client_id);
                }
                self.subscribed = false;
                debug!(client_id = ?self.client_id, "Client unsubscribed from updates");
                return Ok(());
            }

            MessageType::Ping { seq } => DaemonMessage::pong(seq),

            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        };

        self.send_message(reply).await
    }

    /// Decodes a client sync report and reconciles it.
    async fn handle_sync(&mut self, data: serde_json::Value) -> Result<DaemonMessage, ConnectionError> {
        let request = match RawSyncPayload::from_value(data).and_then(|raw| raw.to_sync_request()) {
            Ok(request) => request,
            Err(e) => {
                debug!(client_id = ?self.client_id, error = %e, "Invalid sync payload");
                return Ok(DaemonMessage::error_with_code(&e.to_string(), "invalid_sync"));
            }
        };

        debug!(
            client_id = ?self.client_id,
            work_day_id = %request.work_day_id,
            elapsed_seconds = request.elapsed_seconds,
            is_running = request.is_running,
            "Processing sync"
        );

        match self.ledger.sync(request).await {
            Ok(decision) => Ok(DaemonMessage::sync_result(decision)),
            Err(e) => domain_error_reply(e),
        }
    }

    /// Registers this connection as a subscriber and answers with the
    /// owner's current day when filtered.
    async fn handle_subscribe(
        &mut self,
        owner_id: Option<OwnerId>,
    ) -> Result<DaemonMessage, ConnectionError> {
        let client_id = match &self.client_id {
            Some(id) => id.clone(),
            None => return Ok(DaemonMessage::error("Must connect before subscribing")),
        };

        let subscriber = Subscriber {
            writer: Arc::clone(&self.writer),
            filter: owner_id,
        };
        if let Err(e) = insert_subscriber(&self.subscribers, &client_id, subscriber).await {
            return Ok(DaemonMessage::error_with_code(&e.to_string(), "too_many_subscribers"));
        }

        self.subscribed = true;
        debug!(client_id = %client_id, filter = ?owner_id, "Client subscribed to updates");

        // Initial state for filtered subscriptions
        let day = match owner_id {
            Some(owner_id) => Some(self.ledger.day_status(owner_id, None).await?),
            None => None,
        };
        Ok(DaemonMessage::subscribed(owner_id, day))
    }

    /// Reads a single message from the client.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage =
            serde_json::from_str(&line).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    /// Sends a message to the client.
    async fn send_message(&self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        let mut writer = self.writer.lock().await;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }

    /// Checks if this client is subscribed to events.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Returns the client ID (if connected).
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }
}

/// Turns a domain rejection into an error reply; a closed ledger is fatal
/// for the request.
fn domain_error_reply(err: LedgerError) -> Result<DaemonMessage, ConnectionError> {
    match err.as_domain() {
        Some(domain) => Ok(DaemonMessage::domain_error(domain)),
        None => Err(ConnectionError::LedgerUnavailable),
    }
}

fn day_reply(
    result: Result<worktime_core::WorkDayView, LedgerError>,
) -> Result<DaemonMessage, ConnectionError> {
    match result {
        Ok(view) => Ok(DaemonMessage::work_day(view)),
        Err(e) => domain_error_reply(e),
    }
}

fn entry_reply(
    result: Result<worktime_core::TaskTimeEntry, LedgerError>,
) -> Result<DaemonMessage, ConnectionError> {
    match result {
        Ok(entry) => Ok(DaemonMessage::task_entry(Some(entry))),
        Err(e) => domain_error_reply(e),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Ledger unavailable")]
    LedgerUnavailable,
}

impl From<LedgerError> for ConnectionError {
    fn from(_: LedgerError) -> Self {
        Self::LedgerUnavailable
    }
}
