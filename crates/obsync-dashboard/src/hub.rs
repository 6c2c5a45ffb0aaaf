//! Connection registry and fan-out.
//!
//! Each connection owns a bounded queue of pre-serialized frames that a
//! socket task drains. The hub only ever `try_send`s into those queues, so a
//! stalled client can never hold up a broadcast: a full or closed queue gets
//! its connection unregistered and fan-out continues with the rest.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use obsync_core::{Envelope, ServerMessage, SnapshotProvider, StatusSnapshot};
use obsync_telemetry::Metrics;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::commands::{CommandReply, CommandRouter};
use crate::error::CommandError;

/// Serialized outbound frame, shared by every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Connection state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Server-side handle to one dashboard client.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    tx: mpsc::Sender<Frame>,
    connected_at: DateTime<Utc>,
    state: ConnectionState,
}

impl Connection {
    /// New connection in `Connecting` state, plus the receiving end of its
    /// outbound queue.
    pub fn new(queue_capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let connection = Self {
            id: Uuid::new_v4(),
            tx,
            connected_at: Utc::now(),
            state: ConnectionState::Connecting,
        };
        (connection, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn try_send(&self, frame: &Frame) -> bool {
        self.state == ConnectionState::Open && self.tx.try_send(frame.clone()).is_ok()
    }
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Registry of live dashboard connections.
pub struct BroadcastHub {
    connections: RwLock<HashMap<Uuid, Connection>>,
    snapshot: Arc<dyn SnapshotProvider>,
    commands: CommandRouter,
}

impl BroadcastHub {
    pub fn new(snapshot: Arc<dyn SnapshotProvider>, commands: CommandRouter) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            snapshot,
            commands,
        }
    }

    /// Current state as a snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.snapshot()
    }

    pub fn commands(&self) -> &CommandRouter {
        &self.commands
    }

    /// Add a connection and queue a `ServerStatus` snapshot to it alone.
    ///
    /// The snapshot is queued while the registry is write-locked, so it
    /// precedes every broadcast the connection will see. Returns `false`
    /// (and does not register) if the snapshot could not be queued.
    pub fn register(&self, mut connection: Connection) -> bool {
        let id = connection.id;
        let mut connections = self.connections.write();

        let snapshot = ServerMessage::ServerStatus(self.snapshot.snapshot());
        let frame: Frame = match snapshot.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Failed to serialize snapshot");
                return false;
            }
        };

        connection.state = ConnectionState::Open;
        if !connection.try_send(&frame) {
            debug!(connection_id = %id, "Snapshot could not be queued, not registering");
            return false;
        }

        connections.insert(id, connection);
        let count = connections.len();
        drop(connections);

        Metrics::dashboard_connections(count);
        info!(connection_id = %id, connections = count, "Dashboard client registered");
        true
    }

    /// Remove a connection. Unknown ids are ignored.
    pub fn unregister(&self, id: Uuid) -> bool {
        let mut connections = self.connections.write();
        let Some(mut connection) = connections.remove(&id) else {
            return false;
        };
        connection.state = ConnectionState::Closed;
        let count = connections.len();
        drop(connections);

        Metrics::dashboard_connections(count);
        info!(
            connection_id = %id,
            connections = count,
            connected_secs = (Utc::now() - connection.connected_at).num_seconds(),
            "Dashboard client unregistered"
        );
        true
    }

    /// Serialize once and queue to every open connection.
    pub fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        let frame: Frame = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(message_type = message.message_type(), error = %e, "Failed to serialize broadcast");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let failed: Vec<Uuid> = {
            let connections = self.connections.read();
            connections
                .values()
                .filter_map(|c| {
                    if c.try_send(&frame) {
                        report.delivered += 1;
                        None
                    } else {
                        Some(c.id)
                    }
                })
                .collect()
        };

        for id in failed {
            warn!(connection_id = %id, "Send failed, dropping dashboard client");
            Metrics::connection_dropped();
            if self.unregister(id) {
                report.dropped += 1;
            }
        }

        Metrics::broadcast();
        debug!(
            message_type = message.message_type(),
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast"
        );
        report
    }

    /// Queue a message to one connection. A failed send unregisters it.
    pub fn send_to(&self, id: Uuid, message: &ServerMessage) -> bool {
        let frame: Frame = match message.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(connection_id = %id, error = %e, "Failed to serialize message");
                return false;
            }
        };

        let sent = match self.connections.read().get(&id) {
            Some(connection) => connection.try_send(&frame),
            None => return false,
        };
        if !sent {
            warn!(connection_id = %id, "Send failed, dropping dashboard client");
            Metrics::connection_dropped();
            self.unregister(id);
        }
        sent
    }

    /// Handle one raw frame received from a client.
    ///
    /// Malformed frames are ignored. Unknown command types and handler
    /// failures are answered with an `Error` message to the sender only.
    pub async fn handle_inbound_command(&self, id: Uuid, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(connection_id = %id, error = %e, "Ignoring malformed client frame");
                return;
            }
        };

        let command = self.commands.resolve(&envelope.kind).unwrap_or("unknown");
        debug!(connection_id = %id, command = %envelope.kind, "Client command");

        match self.commands.dispatch(&envelope.kind, envelope.payload).await {
            Ok(reply) => {
                Metrics::command(command, "ok");
                match reply {
                    CommandReply::None => {}
                    CommandReply::Reply(message) => {
                        self.send_to(id, &message);
                    }
                    CommandReply::Broadcast(message) => {
                        self.broadcast(&message);
                    }
                }
            }
            Err(e) => {
                let outcome = match e {
                    CommandError::Unknown(_) => "unknown",
                    _ => "error",
                };
                Metrics::command(command, outcome);
                warn!(connection_id = %id, command = %envelope.kind, error = %e, "Command failed");
                self.send_to(id, &ServerMessage::error(e.to_string()));
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.connections.read().contains_key(&id)
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("connections", &self.connection_count())
            .field("commands", &self.commands)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsync_core::{MockControlClient, ScenePayload};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct SharedSnapshot(Mutex<StatusSnapshot>);

    impl SnapshotProvider for SharedSnapshot {
        fn snapshot(&self) -> StatusSnapshot {
            self.0.lock().clone()
        }
    }

    fn hub_with(mock: Arc<MockControlClient>) -> (BroadcastHub, Arc<SharedSnapshot>) {
        let snapshot = Arc::new(SharedSnapshot::default());
        let commands = CommandRouter::with_obs_commands(mock, snapshot.clone());
        (BroadcastHub::new(snapshot.clone(), commands), snapshot)
    }

    fn hub() -> BroadcastHub {
        hub_with(Arc::new(MockControlClient::new())).0
    }

    fn scene(name: &str) -> ServerMessage {
        ServerMessage::CurrentSceneChanged(ScenePayload {
            scene: name.to_string(),
        })
    }

    fn recv_json(rx: &mut mpsc::Receiver<Frame>) -> Value {
        let frame = rx.try_recv().expect("frame queued");
        serde_json::from_str(&frame).unwrap()
    }

    #[test]
    fn test_register_sends_snapshot_first() {
        let (hub, snapshot) = hub_with(Arc::new(MockControlClient::new()));
        snapshot.0.lock().scene = Some("Intro".to_string());

        let (conn, mut rx) = Connection::new(8);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(hub.register(conn));
        hub.broadcast(&scene("Main"));

        let first = recv_json(&mut rx);
        assert_eq!(first["type"], "ServerStatus");
        assert_eq!(first["payload"]["scene"], "Intro");
        assert_eq!(first["payload"]["protocolVersion"], 1);

        let second = recv_json(&mut rx);
        assert_eq!(second["type"], "CurrentSceneChanged");
        assert_eq!(second["payload"]["scene"], "Main");
    }

    #[test]
    fn test_broadcast_reaches_every_connection() {
        let hub = hub();
        let mut receivers: Vec<_> = (0..3)
            .map(|_| {
                let (conn, rx) = Connection::new(8);
                hub.register(conn);
                rx
            })
            .collect();

        let report = hub.broadcast(&scene("BRB"));
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 0 });

        for rx in &mut receivers {
            recv_json(rx);
            assert_eq!(recv_json(rx)["payload"]["scene"], "BRB");
        }
    }

    #[test]
    fn test_failed_send_drops_only_that_connection() {
        let hub = hub();
        let (a, mut rx_a) = Connection::new(8);
        let (b, rx_b) = Connection::new(8);
        let (c, mut rx_c) = Connection::new(8);
        let b_id = b.id();
        hub.register(a);
        hub.register(b);
        hub.register(c);

        drop(rx_b);
        let report = hub.broadcast(&scene("BRB"));

        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });
        assert!(!hub.contains(b_id));
        assert_eq!(hub.connection_count(), 2);
        for rx in [&mut rx_a, &mut rx_c] {
            recv_json(rx);
            assert_eq!(recv_json(rx)["payload"]["scene"], "BRB");
        }
    }

    #[test]
    fn test_full_queue_counts_as_failure() {
        let hub = hub();
        // Capacity 1 is used up by the snapshot.
        let (slow, _rx) = Connection::new(1);
        let slow_id = slow.id();
        hub.register(slow);

        let report = hub.broadcast(&scene("BRB"));
        assert_eq!(report.dropped, 1);
        assert!(!hub.contains(slow_id));
    }

    #[test]
    fn test_unregister_idempotent() {
        let hub = hub();
        let (conn, _rx) = Connection::new(8);
        let id = conn.id();
        hub.register(conn);

        assert!(hub.unregister(id));
        assert!(!hub.unregister(id));
        assert!(!hub.unregister(Uuid::new_v4()));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_register_with_closed_receiver_fails() {
        let hub = hub();
        let (conn, rx) = Connection::new(8);
        drop(rx);
        assert!(!hub.register(conn));
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_command_ignored() {
        let hub = hub();
        let (conn, mut rx) = Connection::new(8);
        let id = conn.id();
        hub.register(conn);
        recv_json(&mut rx);

        hub.handle_inbound_command(id, "{not json").await;
        hub.handle_inbound_command(id, r#"{"payload": {}}"#).await;
        hub.handle_inbound_command(id, "[1, 2, 3]").await;

        assert!(rx.try_recv().is_err());
        assert!(hub.contains(id));
    }

    #[tokio::test]
    async fn test_unknown_command_answers_sender_only() {
        let hub = hub();
        let (a, mut rx_a) = Connection::new(8);
        let (b, mut rx_b) = Connection::new(8);
        let a_id = a.id();
        hub.register(a);
        hub.register(b);
        recv_json(&mut rx_a);
        recv_json(&mut rx_b);

        hub.handle_inbound_command(a_id, r#"{"type": "SelfDestruct", "payload": {}}"#)
            .await;

        let reply = recv_json(&mut rx_a);
        assert_eq!(reply["type"], "Error");
        assert_eq!(
            reply["payload"]["errorMessage"],
            "Unknown command type: SelfDestruct"
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_forwarded_without_echo() {
        let mock = Arc::new(MockControlClient::new());
        mock.set_response("SetCurrentProgramScene", Value::Null);
        let (hub, _) = hub_with(mock.clone());
        let (conn, mut rx) = Connection::new(8);
        let id = conn.id();
        hub.register(conn);
        recv_json(&mut rx);

        hub.handle_inbound_command(
            id,
            r#"{"type": "SetCurrentScene", "payload": {"sceneName": "BRB"}}"#,
        )
        .await;

        assert_eq!(mock.call_count("SetCurrentProgramScene"), 1);
        assert_eq!(mock.calls()[0].1, Some(json!({"sceneName": "BRB"})));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_command_failure_answers_with_error() {
        let mock = Arc::new(MockControlClient::new());
        mock.set_rejection("SetCurrentProgramScene", 600, "No source was found");
        let (hub, _) = hub_with(mock);
        let (conn, mut rx) = Connection::new(8);
        let id = conn.id();
        hub.register(conn);
        recv_json(&mut rx);

        hub.handle_inbound_command(
            id,
            r#"{"type": "SetCurrentScene", "payload": {"sceneName": "Nope"}}"#,
        )
        .await;

        let reply = recv_json(&mut rx);
        assert_eq!(reply["type"], "Error");
        assert!(reply["payload"]["errorMessage"]
            .as_str()
            .unwrap()
            .contains("No source was found"));
    }

    #[tokio::test]
    async fn test_status_command_replies_to_sender() {
        let (hub, snapshot) = hub_with(Arc::new(MockControlClient::new()));
        let (conn, mut rx) = Connection::new(8);
        let id = conn.id();
        hub.register(conn);
        recv_json(&mut rx);

        snapshot.0.lock().profile = Some("Stream".to_string());
        hub.handle_inbound_command(id, r#"{"type": "GetServerStatus"}"#)
            .await;

        let reply = recv_json(&mut rx);
        assert_eq!(reply["type"], "ServerStatus");
        assert_eq!(reply["payload"]["profile"], "Stream");
    }
}
