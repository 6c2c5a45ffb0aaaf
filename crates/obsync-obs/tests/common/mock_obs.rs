//! Mock obs-websocket server for integration tests.
//!
//! Speaks enough of the protocol to exercise the client:
//! - Hello with an optional authentication challenge
//! - Identify verification
//! - a handful of requests backed by a single "current scene" value
//! - `CurrentProgramSceneChanged` events

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use obsync_obs::protocol::auth_string;
use obsync_obs::ObsConfig;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, tungstenite::Message};

const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";
const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";

pub const AVAILABLE_REQUESTS: &[&str] = &[
    "GetVersion",
    "GetCurrentProgramScene",
    "SetCurrentProgramScene",
];

#[derive(Clone)]
struct Shared {
    password: Option<String>,
    scene: Arc<Mutex<String>>,
    connections: Arc<AtomicUsize>,
    kill_tx: broadcast::Sender<()>,
}

/// A mock OBS instance.
pub struct MockObs {
    addr: SocketAddr,
    shared: Shared,
}

impl MockObs {
    /// Start a mock on an available port.
    pub async fn start(password: Option<&str>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (kill_tx, _) = broadcast::channel(4);
        let shared = Shared {
            password: password.map(str::to_string),
            scene: Arc::new(Mutex::new("Main".to_string())),
            connections: Arc::new(AtomicUsize::new(0)),
            kill_tx,
        };

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_shared.clone()));
            }
        });

        Self { addr, shared }
    }

    /// Client configuration pointing at this mock.
    pub fn config(&self, password: &str) -> ObsConfig {
        ObsConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            password: password.to_string(),
            ..Default::default()
        }
    }

    pub fn connection_count(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    pub fn current_scene(&self) -> String {
        self.shared.scene.lock().clone()
    }

    /// Drop every open connection.
    pub fn disconnect_all(&self) {
        let _ = self.shared.kill_tx.send(());
    }
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    shared.connections.fetch_add(1, Ordering::SeqCst);
    let mut kill_rx = shared.kill_tx.subscribe();

    let mut hello = json!({"obsWebSocketVersion": "5.5.0", "rpcVersion": 1});
    if shared.password.is_some() {
        hello["authentication"] = json!({"challenge": CHALLENGE, "salt": SALT});
    }
    if ws.send(frame(0, hello)).await.is_err() {
        return;
    }

    let Some(Ok(Message::Text(identify))) = ws.next().await else {
        return;
    };
    let identify: Value = serde_json::from_str(&identify).unwrap_or_default();
    if let Some(password) = &shared.password {
        let expected = auth_string(password, CHALLENGE, SALT);
        if identify["d"]["authentication"] != json!(expected) {
            let _ = ws
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Library(4009),
                    reason: "Authentication failed.".into(),
                })))
                .await;
            return;
        }
    }
    if ws
        .send(frame(2, json!({"negotiatedRpcVersion": 1})))
        .await
        .is_err()
    {
        return;
    }

    loop {
        let msg = tokio::select! {
            _ = kill_rx.recv() => break,
            msg = ws.next() => msg,
        };
        let Some(Ok(Message::Text(text))) = msg else {
            break;
        };
        let Ok(request) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        for reply in handle_request(&request["d"], &shared) {
            if ws.send(reply).await.is_err() {
                return;
            }
        }
    }
}

fn handle_request(d: &Value, shared: &Shared) -> Vec<Message> {
    let request_type = d["requestType"].as_str().unwrap_or_default().to_string();
    let request_id = d["requestId"].clone();
    let respond = |result: bool, code: u32, data: Option<Value>| {
        let mut body = json!({
            "requestType": request_type,
            "requestId": request_id,
            "requestStatus": {"result": result, "code": code},
        });
        if let Some(data) = data {
            body["responseData"] = data;
        }
        frame(7, body)
    };

    match request_type.as_str() {
        "GetVersion" => vec![respond(
            true,
            100,
            Some(json!({
                "obsVersion": "30.0.0",
                "obsWebSocketVersion": "5.5.0",
                "availableRequests": AVAILABLE_REQUESTS,
            })),
        )],
        "GetCurrentProgramScene" => {
            let scene = shared.scene.lock().clone();
            vec![respond(
                true,
                100,
                Some(json!({"currentProgramSceneName": scene, "sceneName": scene})),
            )]
        }
        "SetCurrentProgramScene" => {
            let Some(scene) = d["requestData"]["sceneName"].as_str() else {
                return vec![respond(false, 300, None)];
            };
            *shared.scene.lock() = scene.to_string();
            vec![
                frame(
                    5,
                    json!({
                        "eventType": "CurrentProgramSceneChanged",
                        "eventIntent": 4,
                        "eventData": {"sceneName": scene}
                    }),
                ),
                respond(true, 100, None),
            ]
        }
        _ => vec![respond(false, 204, None)],
    }
}

fn frame(op: u8, d: Value) -> Message {
    Message::Text(json!({"op": op, "d": d}).to_string())
}
