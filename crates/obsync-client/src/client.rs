//! Dashboard connection.
//!
//! Holds at most one socket at a time. A run loop drives the lifecycle:
//! connect, request a snapshot, apply inbound messages, and on close either
//! wait the fixed retry delay or give up for good.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use obsync_core::{command, Envelope};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::{DispatchOutcome, DispatchTable};
use crate::error::{ClientError, ClientResult};
use crate::lifecycle::{CloseAction, ConnectionStatus, Lifecycle};
use crate::state::ClientState;

struct RunLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RunLoop {
    fn is_alive(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

/// One logical connection to the dashboard server.
pub struct DashboardConnection {
    config: ClientConfig,
    lifecycle: Mutex<Lifecycle>,
    dispatch: DispatchTable,
    status_tx: watch::Sender<ConnectionStatus>,
    state_tx: watch::Sender<ClientState>,
    /// Present only while connected.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    run_loop: Mutex<Option<RunLoop>>,
    shutdown_token: CancellationToken,
}

impl DashboardConnection {
    pub fn new(config: ClientConfig) -> Arc<Self> {
        Self::with_dispatch(config, DispatchTable::standard())
    }

    pub fn with_dispatch(config: ClientConfig, dispatch: DispatchTable) -> Arc<Self> {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (state_tx, _) = watch::channel(ClientState::default());
        Arc::new(Self {
            lifecycle: Mutex::new(Lifecycle::new(&config)),
            config,
            dispatch,
            status_tx,
            state_tx,
            outbound: Mutex::new(None),
            run_loop: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        })
    }

    /// Start connecting.
    ///
    /// No-op (returns `false`) while connected or while a run loop is still
    /// alive. After retries are exhausted this is the manual recovery path:
    /// the terminal state is cleared and a fresh run loop starts.
    pub fn initialize(self: &Arc<Self>) -> bool {
        if self.shutdown_token.is_cancelled() {
            warn!("Connection shut down, not initializing");
            return false;
        }

        let mut run_loop = self.run_loop.lock();
        if self.status() == ConnectionStatus::Connected
            || run_loop.as_ref().is_some_and(RunLoop::is_alive)
        {
            debug!("Dashboard connection already active");
            return false;
        }

        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.is_terminal() {
                info!("Clearing terminal connection state");
                lifecycle.reset();
            }
        }

        let token = self.shutdown_token.child_token();
        let task = tokio::spawn(self.clone().run(token.clone()));
        *run_loop = Some(RunLoop { token, task });
        true
    }

    /// Send a command. Never queued for later: fails unless connected.
    pub fn send(&self, message_type: &str, payload: Value) -> ClientResult<()> {
        let outbound = self.outbound.lock().clone();
        let Some(outbound) = outbound.filter(|_| self.status() == ConnectionStatus::Connected)
        else {
            self.lifecycle
                .lock()
                .on_error(format!("Cannot send {message_type}: not connected"));
            return Err(ClientError::NotConnected);
        };

        let frame = Envelope::new(message_type, payload).to_json()?;
        outbound.try_send(Message::Text(frame)).map_err(|e| {
            let err = ClientError::SendFailed(e.to_string());
            self.lifecycle.lock().on_error(err.to_string());
            err
        })
    }

    /// Close the socket and stop reconnecting.
    pub fn shutdown(&self) {
        self.shutdown_token.cancel();
        if let Some(run_loop) = self.run_loop.lock().take() {
            run_loop.token.cancel();
        }
        info!("Dashboard connection shut down");
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Copy of the current state.
    pub fn state(&self) -> ClientState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ClientState> {
        self.state_tx.subscribe()
    }

    /// User-visible error, if any. Transient errors clear on their own.
    pub fn current_error(&self) -> Option<String> {
        self.lifecycle
            .lock()
            .current_error(Instant::now())
            .map(str::to_string)
    }

    pub fn is_terminal(&self) -> bool {
        self.lifecycle.lock().is_terminal()
    }

    pub fn retry_count(&self) -> u32 {
        self.lifecycle.lock().retry_count()
    }

    /// Total connection attempts since creation.
    pub fn connect_attempts(&self) -> u64 {
        self.lifecycle.lock().connect_attempts()
    }

    pub fn is_running(&self) -> bool {
        self.run_loop.lock().as_ref().is_some_and(RunLoop::is_alive)
    }

    fn publish_status(&self) {
        let status = self.lifecycle.lock().status();
        self.status_tx.send_replace(status);
        self.state_tx.send_if_modified(|state| {
            let changed = state.connection != status;
            state.connection = status;
            changed
        });
    }

    async fn run(self: Arc<Self>, token: CancellationToken) {
        loop {
            if !self.lifecycle.lock().on_connecting() {
                break;
            }
            self.publish_status();
            info!(url = %self.config.url, "Connecting to dashboard");

            let session = tokio::select! {
                () = token.cancelled() => Ok(()),
                result = self.run_session(&token) => result,
            };
            *self.outbound.lock() = None;

            if let Err(e) = session {
                warn!(error = %e, "Dashboard connection error");
                self.lifecycle.lock().on_error(e.to_string());
            }

            let action = self.lifecycle.lock().on_close();
            self.publish_status();
            if token.is_cancelled() {
                break;
            }

            match action {
                CloseAction::Retry(delay) => {
                    info!(
                        attempt = self.retry_count(),
                        max = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting to dashboard"
                    );
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                CloseAction::GiveUp => {
                    error!(
                        max = self.config.max_retries,
                        "Dashboard reconnect attempts exhausted"
                    );
                    break;
                }
            }
        }
        debug!("Dashboard run loop exited");
    }

    async fn run_session(&self, token: &CancellationToken) -> ClientResult<()> {
        let (ws, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
        let (mut write, mut read) = ws.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel(self.config.outbound_queue.max(1));

        self.lifecycle.lock().on_open();
        *self.outbound.lock() = Some(outbound_tx);
        self.publish_status();
        info!(url = %self.config.url, "Connected to dashboard");

        self.send(command::GET_SERVER_STATUS, json!({}))?;

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(msg) = outbound_rx.recv() => {
                    write
                        .send(msg)
                        .await
                        .map_err(|e| ClientError::WebSocket(e.to_string()))?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.apply(&text),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Dashboard closed the connection");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ClientError::WebSocket(e.to_string())),
                    None => return Ok(()),
                }
            }
        }
    }

    fn apply(&self, text: &str) {
        let mut outcome = DispatchOutcome::Malformed;
        self.state_tx.send_if_modified(|state| {
            outcome = self.dispatch.dispatch(state, text);
            matches!(outcome, DispatchOutcome::Applied(_))
        });
    }
}

impl std::fmt::Debug for DashboardConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardConnection")
            .field("url", &self.config.url)
            .field("status", &self.status())
            .finish()
    }
}
