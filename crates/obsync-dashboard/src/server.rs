//! HTTP server implementation using axum.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::StreamExt;
use futures_util::SinkExt;
use obsync_core::StatusSnapshot;
use obsync_telemetry::Metrics;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::config::DashboardConfig;
use crate::error::{DashboardError, DashboardResult};
use crate::hub::{BroadcastHub, Connection};

/// Connection limiter to prevent too many concurrent WebSocket connections.
pub struct ConnectionLimiter {
    current: AtomicUsize,
    max: usize,
}

impl ConnectionLimiter {
    pub fn new(max: usize) -> Self {
        Self {
            current: AtomicUsize::new(0),
            max,
        }
    }

    /// Reserve a slot. The slot is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<ConnectionGuard> {
        loop {
            let current = self.current.load(Ordering::Acquire);
            if current >= self.max {
                return None;
            }
            if self
                .current
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ConnectionGuard {
                    limiter: self.clone(),
                });
            }
        }
    }

    pub fn current_count(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }
}

pub struct ConnectionGuard {
    limiter: Arc<ConnectionLimiter>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.limiter.current.fetch_sub(1, Ordering::Release);
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    hub: Arc<BroadcastHub>,
    connection_limiter: Arc<ConnectionLimiter>,
    config: DashboardConfig,
    shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(
        hub: Arc<BroadcastHub>,
        config: DashboardConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            hub,
            connection_limiter: Arc::new(ConnectionLimiter::new(config.max_connections)),
            config,
            shutdown_token,
        }
    }
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/snapshot", get(get_snapshot))
        .route("/metrics", get(get_metrics))
        .route("/health", get(get_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Get current state snapshot as JSON.
async fn get_snapshot(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.hub.snapshot())
}

/// Prometheus text exposition.
async fn get_metrics() -> Response {
    match Metrics::encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connections": state.hub.connection_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let Some(guard) = state.connection_limiter.try_acquire() else {
        warn!(
            current = state.connection_limiter.current_count(),
            max = state.config.max_connections,
            "WebSocket connection limit reached"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
    };

    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, guard))
}

/// Handle a WebSocket connection.
async fn handle_ws_connection(socket: WebSocket, state: AppState, _guard: ConnectionGuard) {
    let (connection, mut outbound_rx) = Connection::new(state.config.client_queue_capacity);
    let id = connection.id();
    let (mut sender, mut receiver) = socket.split();

    if !state.hub.register(connection) {
        return;
    }

    // Inbound frames are commands, handled one at a time per client.
    let hub = state.hub.clone();
    let mut incoming_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => hub.handle_inbound_command(id, text.as_str()).await,
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %id, "Client sent close frame");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(connection_id = %id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    debug!(connection_id = %id, "Dropped by hub, closing socket");
                    break;
                };
                if sender.send(Message::Text(frame.to_string().into())).await.is_err() {
                    debug!(connection_id = %id, "Failed to send message, client disconnected");
                    break;
                }
            }
            _ = &mut incoming_task => {
                debug!(connection_id = %id, "Incoming task completed, closing connection");
                break;
            }
            () = state.shutdown_token.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    incoming_task.abort();
    state.hub.unregister(id);
}

/// Serve the dashboard on an already bound listener until `shutdown_token` is cancelled.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<BroadcastHub>,
    config: DashboardConfig,
    shutdown_token: CancellationToken,
) -> DashboardResult<()> {
    let app = create_router(AppState::new(hub, config, shutdown_token.clone()));

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Dashboard server listening");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .map_err(DashboardError::Serve)?;

    info!("Dashboard server stopped");
    Ok(())
}

/// Bind the configured address and serve.
pub async fn run_server(
    hub: Arc<BroadcastHub>,
    config: DashboardConfig,
    shutdown_token: CancellationToken,
) -> DashboardResult<()> {
    let addr = config.socket_addr()?;
    info!(port = config.port, "Starting dashboard server");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| DashboardError::Bind { addr, source })?;
    serve(listener, hub, config, shutdown_token).await
}
