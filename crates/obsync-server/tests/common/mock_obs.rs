//! Minimal obs-websocket server: no authentication, a reduced request set,
//! and scene switches announced as events.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use obsync_obs::ObsConfig;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const AVAILABLE_REQUESTS: &[&str] = &[
    "GetVersion",
    "GetCurrentProgramScene",
    "SetCurrentProgramScene",
    "GetVideoSettings",
];

#[derive(Clone)]
struct Shared {
    scene: Arc<Mutex<String>>,
    scene_requests: Arc<AtomicUsize>,
    events_tx: broadcast::Sender<String>,
}

pub struct MockObs {
    addr: SocketAddr,
    shared: Shared,
}

impl MockObs {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, _) = broadcast::channel(16);
        let shared = Shared {
            scene: Arc::new(Mutex::new("Main".to_string())),
            scene_requests: Arc::new(AtomicUsize::new(0)),
            events_tx,
        };

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_shared.clone()));
            }
        });

        Self { addr, shared }
    }

    pub fn config(&self) -> ObsConfig {
        ObsConfig {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            ..Default::default()
        }
    }

    /// Switch scene as if done in the OBS UI.
    pub fn switch_scene(&self, scene: &str) {
        *self.shared.scene.lock() = scene.to_string();
        let _ = self.shared.events_tx.send(scene_event(scene));
    }

    pub fn scene_requests(&self) -> usize {
        self.shared.scene_requests.load(Ordering::SeqCst)
    }
}

async fn handle_connection(stream: TcpStream, shared: Shared) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let mut events_rx = shared.events_tx.subscribe();

    let hello = json!({"obsWebSocketVersion": "5.5.0", "rpcVersion": 1});
    if ws.send(frame(0, hello)).await.is_err() {
        return;
    }
    let Some(Ok(Message::Text(_identify))) = ws.next().await else {
        return;
    };
    if ws
        .send(frame(2, json!({"negotiatedRpcVersion": 1})))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Ok(event) = event else { return };
                if ws.send(Message::Text(event)).await.is_err() {
                    return;
                }
            }
            msg = ws.next() => {
                let Some(Ok(Message::Text(text))) = msg else { return };
                let Ok(request) = serde_json::from_str::<Value>(&text) else { continue };
                let reply = handle_request(&request["d"], &shared);
                if ws.send(reply).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn handle_request(d: &Value, shared: &Shared) -> Message {
    let request_type = d["requestType"].as_str().unwrap_or_default().to_string();
    let respond = |result: bool, code: u32, data: Value| {
        frame(
            7,
            json!({
                "requestType": request_type,
                "requestId": d["requestId"],
                "requestStatus": {"result": result, "code": code},
                "responseData": data,
            }),
        )
    };

    match request_type.as_str() {
        "GetVersion" => respond(
            true,
            100,
            json!({
                "obsVersion": "30.0.0",
                "obsWebSocketVersion": "5.5.0",
                "availableRequests": AVAILABLE_REQUESTS,
            }),
        ),
        "GetCurrentProgramScene" => {
            shared.scene_requests.fetch_add(1, Ordering::SeqCst);
            let scene = shared.scene.lock().clone();
            respond(true, 100, json!({"currentProgramSceneName": scene}))
        }
        "GetVideoSettings" => respond(
            true,
            100,
            json!({"baseWidth": 1920, "baseHeight": 1080, "fpsNumerator": 60, "fpsDenominator": 1}),
        ),
        "SetCurrentProgramScene" => match d["requestData"]["sceneName"].as_str() {
            Some(scene) => {
                *shared.scene.lock() = scene.to_string();
                let _ = shared.events_tx.send(scene_event(scene));
                respond(true, 100, Value::Null)
            }
            None => respond(false, 300, Value::Null),
        },
        _ => respond(false, 204, Value::Null),
    }
}

fn scene_event(scene: &str) -> String {
    json!({
        "op": 5,
        "d": {
            "eventType": "CurrentProgramSceneChanged",
            "eventIntent": 4,
            "eventData": {"sceneName": scene}
        }
    })
    .to_string()
}

fn frame(op: u8, d: Value) -> Message {
    Message::Text(json!({"op": op, "d": d}).to_string())
}
