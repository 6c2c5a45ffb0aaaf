//! obs-websocket control client.
//!
//! One authenticated session is shared by every caller. Requests are written
//! through an outbound channel and correlated with their responses by request
//! id; events are fanned out through a broadcast channel that outlives
//! individual sessions, so subscribers keep receiving after a reconnect.
//!
//! A lost session is not retried in the background. The next call opens a new
//! one, and emits `ControlEvent::IDENTIFIED` once it is established.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use obsync_core::{BoxFuture, ControlClient, ControlError, ControlEvent, ControlResult};
use obsync_telemetry::Metrics;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::ObsConfig;
use crate::protocol::{self, op, Event, Frame, Hello, RequestResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<ControlResult<Value>>>>>;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

struct Session {
    outbound: mpsc::Sender<Message>,
    pending: Pending,
    closed: CancellationToken,
}

impl Session {
    fn is_alive(&self) -> bool {
        !self.closed.is_cancelled()
    }
}

/// obs-websocket 5.x client.
pub struct ObsClient {
    config: ObsConfig,
    session: TokioMutex<Option<Arc<Session>>>,
    state: Arc<RwLock<ConnectionState>>,
    events: broadcast::Sender<ControlEvent>,
    /// `GetVersion.availableRequests`; `None` until the first successful query.
    available_requests: RwLock<Option<HashSet<String>>>,
    next_request_id: AtomicU64,
    shutdown_token: CancellationToken,
}

impl ObsClient {
    pub fn new(config: ObsConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            session: TokioMutex::new(None),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            events,
            available_requests: RwLock::new(None),
            next_request_id: AtomicU64::new(1),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ObsConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open a session and load the request types OBS supports.
    pub async fn connect(&self) -> ControlResult<()> {
        self.session().await?;
        self.refresh_capabilities().await
    }

    /// Query `GetVersion` and remember `availableRequests`.
    pub async fn refresh_capabilities(&self) -> ControlResult<()> {
        let version = self.request("GetVersion", None).await?;
        let requests: HashSet<String> = version
            .get("availableRequests")
            .and_then(|v| v.as_array())
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        info!(
            obs_version = version.get("obsVersion").and_then(|v| v.as_str()).unwrap_or("unknown"),
            websocket_version = version
                .get("obsWebSocketVersion")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
            available_requests = requests.len(),
            "OBS capabilities loaded"
        );
        *self.available_requests.write() = Some(requests);
        Ok(())
    }

    /// Close the session and refuse further calls.
    pub fn shutdown(&self) {
        info!("Shutting down OBS client");
        self.shutdown_token.cancel();
    }

    async fn session(&self) -> ControlResult<Arc<Session>> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref().filter(|s| s.is_alive()) {
            return Ok(session.clone());
        }
        if self.shutdown_token.is_cancelled() {
            return Err(ControlError::Disconnected);
        }

        *self.state.write() = ConnectionState::Connecting;
        let established =
            match tokio::time::timeout(self.config.connect_timeout(), self.establish()).await {
                Ok(result) => result,
                Err(_) => Err(ControlError::Unreachable(format!(
                    "OBS handshake timed out after {}ms",
                    self.config.connect_timeout_ms
                ))),
            };

        match established {
            Ok(session) => {
                *guard = Some(session.clone());
                *self.state.write() = ConnectionState::Connected;
                Metrics::control_connected();
                info!(url = %self.config.url(), "Connected to OBS");
                // No subscribers is fine.
                let _ = self
                    .events
                    .send(ControlEvent::new(ControlEvent::IDENTIFIED, Value::Null));
                Ok(session)
            }
            Err(e) => {
                *guard = None;
                *self.state.write() = ConnectionState::Disconnected;
                debug!(url = %self.config.url(), error = %e, "OBS connection attempt failed");
                Err(e)
            }
        }
    }

    async fn establish(&self) -> ControlResult<Arc<Session>> {
        protocol::validate_host(&self.config.host)?;

        let (mut ws, _) = connect_async(self.config.url()).await.map_err(unreachable)?;

        let hello: Hello = serde_json::from_value(read_frame(&mut ws, op::HELLO).await?)?;
        debug!(
            version = hello.obs_web_socket_version.as_deref().unwrap_or("unknown"),
            auth = hello.authentication.is_some(),
            "OBS hello received"
        );

        let identify = protocol::identify(&hello, self.config.password())?;
        ws.send(Message::Text(identify.to_string()))
            .await
            .map_err(unreachable)?;
        read_frame(&mut ws, op::IDENTIFIED).await?;

        let (write, read) = ws.split();
        let (outbound, outbound_rx) = mpsc::channel(64);
        let session = Arc::new(Session {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            closed: self.shutdown_token.child_token(),
        });

        tokio::spawn(run_writer(write, outbound_rx, session.closed.clone()));
        tokio::spawn(run_reader(
            read,
            session.pending.clone(),
            self.events.clone(),
            session.closed.clone(),
            self.state.clone(),
        ));

        Ok(session)
    }

    async fn request(&self, request_type: &str, params: Option<Value>) -> ControlResult<Value> {
        let session = self.session().await?;
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed).to_string();

        let (tx, rx) = oneshot::channel();
        session.pending.lock().insert(request_id.clone(), tx);
        // The reader drains pending requests after closing; anything inserted
        // later would never be answered.
        if !session.is_alive() {
            session.pending.lock().remove(&request_id);
            return Err(ControlError::Disconnected);
        }

        trace!(request_type, request_id = %request_id, "OBS request");
        let frame = protocol::request(&request_id, request_type, params);
        if session
            .outbound
            .send(Message::Text(frame.to_string()))
            .await
            .is_err()
        {
            session.pending.lock().remove(&request_id);
            return Err(ControlError::Disconnected);
        }

        rx.await.map_err(|_| ControlError::Disconnected)?
    }
}

impl ControlClient for ObsClient {
    fn call(
        &self,
        request_type: &str,
        params: Option<Value>,
    ) -> BoxFuture<'_, ControlResult<Value>> {
        let request_type = request_type.to_string();
        Box::pin(async move { self.request(&request_type, params).await })
    }

    fn supports(&self, request_type: &str) -> bool {
        self.available_requests
            .read()
            .as_ref()
            .map_or(true, |set| set.contains(request_type))
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ControlEvent>> {
        Some(self.events.subscribe())
    }
}

impl std::fmt::Debug for ObsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObsClient")
            .field("url", &self.config.url())
            .field("state", &self.state())
            .finish()
    }
}

fn unreachable(e: impl Display) -> ControlError {
    ControlError::Unreachable(e.to_string())
}

/// Read frames until one with the expected op code arrives.
async fn read_frame(ws: &mut WsStream, expected: u8) -> ControlResult<Value> {
    while let Some(msg) = ws.next().await {
        match msg.map_err(unreachable)? {
            Message::Text(text) => {
                let frame: Frame = serde_json::from_str(&text)?;
                if frame.op == expected {
                    return Ok(frame.d);
                }
                debug!(op = frame.op, expected, "Skipping frame during handshake");
            }
            Message::Close(close) => {
                let reason = close
                    .map(|c| format!("{} {}", u16::from(c.code), c.reason))
                    .unwrap_or_default();
                return Err(ControlError::Unreachable(format!(
                    "OBS closed the connection during handshake: {reason}"
                )));
            }
            _ => {}
        }
    }
    Err(ControlError::Unreachable(
        "OBS connection ended during handshake".into(),
    ))
}

async fn run_writer(
    mut write: SplitSink<WsStream, Message>,
    mut outbound_rx: mpsc::Receiver<Message>,
    closed: CancellationToken,
) {
    loop {
        tokio::select! {
            () = closed.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = outbound_rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write.send(msg).await {
                    warn!(error = %e, "OBS write failed");
                    break;
                }
            }
        }
    }
    closed.cancel();
}

async fn run_reader(
    mut read: SplitStream<WsStream>,
    pending: Pending,
    events: broadcast::Sender<ControlEvent>,
    closed: CancellationToken,
    state: Arc<RwLock<ConnectionState>>,
) {
    loop {
        let msg = tokio::select! {
            () = closed.cancelled() => break,
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => handle_frame(&text, &pending, &events),
            Some(Ok(Message::Close(close))) => {
                info!(?close, "OBS closed the connection");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "OBS read failed");
                break;
            }
            None => break,
        }
    }

    closed.cancel();
    *state.write() = ConnectionState::Disconnected;
    Metrics::control_disconnected();

    let orphaned: Vec<_> = pending.lock().drain().collect();
    for (_, tx) in orphaned {
        let _ = tx.send(Err(ControlError::Disconnected));
    }
    warn!("OBS session closed");
}

fn handle_frame(
    text: &str,
    pending: &Pending,
    events: &broadcast::Sender<ControlEvent>,
) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "Unparseable OBS frame");
            return;
        }
    };

    match frame.op {
        op::REQUEST_RESPONSE => match serde_json::from_value::<RequestResponse>(frame.d) {
            Ok(response) => {
                let tx = pending.lock().remove(&response.request_id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(response.into_result());
                    }
                    None => trace!(request_id = %response.request_id, "Response without waiter"),
                }
            }
            Err(e) => debug!(error = %e, "Malformed OBS request response"),
        },
        op::EVENT => match serde_json::from_value::<Event>(frame.d) {
            Ok(event) => {
                trace!(event_type = %event.event_type, "OBS event");
                let _ = events.send(event.into());
            }
            Err(e) => debug!(error = %e, "Malformed OBS event"),
        },
        other => trace!(op = other, "Ignoring OBS frame"),
    }
}
