//! Socket front end of the ledger.
//!
//! Every accepted connection gets its own [`ConnectionHandler`] task talking
//! to the shared [`LedgerHandle`]. A single forwarder task turns ledger
//! events into `day_updated` / `task_timer_changed` pushes for the clients
//! that subscribed, honouring each client's owner filter.

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, Subscriber, SubscribersMap};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use worktime_protocol::DaemonMessage;

use crate::ledger::{LedgerEvent, LedgerHandle};

/// Upper bound on clients receiving pushed updates.
pub(crate) const MAX_SUBSCRIBERS: usize = 32;

/// Accepts clients on a Unix socket until cancelled.
pub struct DaemonServer {
    socket_path: PathBuf,
    ledger: LedgerHandle,
    cancel_token: CancellationToken,
    connections: AtomicU64,
    subscribers: SubscribersMap,
}

impl DaemonServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        ledger: LedgerHandle,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            ledger,
            cancel_token,
            connections: AtomicU64::new(0),
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Serves clients until the cancellation token fires, then removes the
    /// socket file.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().map_err(|e| ServerError::SocketSetup {
            path: self.socket_path.clone(),
            error: e.to_string(),
        })?;
        info!(socket = %self.socket_path.display(), "Accepting worktime clients");

        self.spawn_event_forwarder();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => self.spawn_connection(stream),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Binds the listener, replacing a stale socket left by a previous run.
    fn bind(&self) -> io::Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        UnixListener::bind(&self.socket_path)
    }

    fn spawn_connection(&self, stream: UnixStream) {
        let conn_num = self.connections.fetch_add(1, Ordering::Relaxed);
        let (reader, writer) = stream.into_split();
        let ledger = self.ledger.clone();
        let subscribers = Arc::clone(&self.subscribers);

        tokio::spawn(async move {
            let handler =
                ConnectionHandler::new(reader, writer, ledger, Arc::clone(&subscribers), conn_num);
            if let Some(client_id) = handler.run().await {
                if subscribers.write().await.remove(&client_id).is_some() {
                    debug!(client_id = %client_id, "Dropped subscription of closed connection");
                }
            }
        });
    }

    fn spawn_event_forwarder(&self) {
        let mut events = self.ledger.subscribe();
        let subscribers = Arc::clone(&self.subscribers);
        let cancel_token = self.cancel_token.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(event) => broadcast_event(&subscribers, &event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Subscribers missed ledger events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Event forwarder stopped");
        });
    }

    async fn shutdown(&self) {
        self.subscribers.write().await.clear();

        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove socket file");
            }
        }
        info!("Server stopped");
    }
}

/// Adds or replaces a client's subscription.
///
/// A client already subscribed may change its filter even at the limit.
pub(crate) async fn insert_subscriber(
    subscribers: &SubscribersMap,
    client_id: &str,
    subscriber: Subscriber,
) -> Result<(), ServerError> {
    let mut subs = subscribers.write().await;
    if subs.len() >= MAX_SUBSCRIBERS && !subs.contains_key(client_id) {
        return Err(ServerError::TooManySubscribers {
            max: MAX_SUBSCRIBERS,
        });
    }
    subs.insert(client_id.to_string(), subscriber);
    Ok(())
}

fn event_message(event: &LedgerEvent) -> DaemonMessage {
    match event {
        LedgerEvent::DayUpdated { day } => DaemonMessage::day_updated((**day).clone()),
        LedgerEvent::TaskTimerChanged { entry } => DaemonMessage::task_timer_changed(entry.clone()),
    }
}

/// Pushes one event to every subscriber whose filter matches its owner.
///
/// Subscribers whose socket fails are dropped.
async fn broadcast_event(subscribers: &SubscribersMap, event: &LedgerEvent) {
    let owner_id = event.owner_id();
    let mut line = match serde_json::to_string(&event_message(event)) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize ledger event");
            return;
        }
    };
    line.push('\n');

    let mut dead = Vec::new();
    {
        let subs = subscribers.read().await;
        for (client_id, sub) in subs.iter().filter(|(_, sub)| sub.accepts(owner_id)) {
            let mut writer = sub.writer.lock().await;
            let sent = match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                debug!(client_id = %client_id, owner_id = %owner_id, error = %e, "Push failed");
                dead.push(client_id.clone());
            }
        }
    }

    if !dead.is_empty() {
        let mut subs = subscribers.write().await;
        for client_id in dead {
            subs.remove(&client_id);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to setup socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Too many subscribers (max: {max})")]
    TooManySubscribers { max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tokio::io::{AsyncBufReadExt, BufReader, BufWriter};
    use tokio::sync::Mutex;
    use worktime_core::{DailyTargetPolicy, OwnerId, WorkDayView};

    fn subscriber(filter: Option<OwnerId>) -> (Subscriber, BufReader<UnixStream>) {
        let (ours, theirs) = UnixStream::pair().unwrap();
        let (_, writer) = ours.into_split();
        let sub = Subscriber {
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
            filter,
        };
        (sub, BufReader::new(theirs))
    }

    fn day_event(owner: u64) -> LedgerEvent {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let day = WorkDayView::no_active_day(OwnerId::new(owner), date, &DailyTargetPolicy::default());
        LedgerEvent::DayUpdated { day: Box::new(day) }
    }

    #[tokio::test]
    async fn test_broadcast_respects_owner_filter() {
        let subscribers: SubscribersMap = Arc::new(RwLock::new(HashMap::new()));
        let (alice, mut alice_rx) = subscriber(Some(OwnerId::new(1)));
        let (all, mut all_rx) = subscriber(None);
        insert_subscriber(&subscribers, "alice", alice).await.unwrap();
        insert_subscriber(&subscribers, "all", all).await.unwrap();

        broadcast_event(&subscribers, &day_event(2)).await;
        broadcast_event(&subscribers, &day_event(1)).await;

        let mut line = String::new();
        alice_rx.read_line(&mut line).await.unwrap();
        let msg: DaemonMessage = serde_json::from_str(&line).unwrap();
        match msg {
            DaemonMessage::DayUpdated { day } => assert_eq!(day.owner_id, OwnerId::new(1)),
            other => panic!("Expected DayUpdated, got {other:?}"),
        }

        let mut owners = Vec::new();
        for _ in 0..2 {
            let mut line = String::new();
            all_rx.read_line(&mut line).await.unwrap();
            if let DaemonMessage::DayUpdated { day } = serde_json::from_str(&line).unwrap() {
                owners.push(day.owner_id.get());
            }
        }
        assert_eq!(owners, vec![2, 1]);
    }

    #[tokio::test]
    async fn test_subscriber_limit_allows_refiltering() {
        let subscribers: SubscribersMap = Arc::new(RwLock::new(HashMap::new()));
        let mut peers = Vec::new();
        for i in 0..MAX_SUBSCRIBERS {
            let (sub, peer) = subscriber(None);
            insert_subscriber(&subscribers, &format!("client-{i}"), sub)
                .await
                .unwrap();
            peers.push(peer);
        }

        let (extra, _peer) = subscriber(None);
        let err = insert_subscriber(&subscribers, "client-extra", extra)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Too many subscribers (max: 32)");

        let (refiltered, _peer) = subscriber(Some(OwnerId::new(3)));
        insert_subscriber(&subscribers, "client-0", refiltered)
            .await
            .unwrap();
        let subs = subscribers.read().await;
        assert_eq!(subs.len(), MAX_SUBSCRIBERS);
        assert_eq!(subs["client-0"].filter, Some(OwnerId::new(3)));
    }

    #[tokio::test]
    async fn test_failed_push_drops_subscriber() {
        let subscribers: SubscribersMap = Arc::new(RwLock::new(HashMap::new()));
        let (sub, peer) = subscriber(None);
        insert_subscriber(&subscribers, "gone", sub).await.unwrap();
        drop(peer);

        broadcast_event(&subscribers, &day_event(1)).await;

        assert!(subscribers.read().await.is_empty());
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError::SocketSetup {
            path: PathBuf::from("/tmp/test.sock"),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/tmp/test.sock"));
        assert!(err.to_string().contains("permission denied"));
    }
}
