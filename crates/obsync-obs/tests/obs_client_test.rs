//! ObsClient against a mock obs-websocket server.

mod common;

use std::time::Duration;

use common::mock_obs::MockObs;
use obsync_core::{ControlClient, ControlError, ControlEvent};
use obsync_obs::{ConnectionState, ObsClient};
use serde_json::json;
use tokio::sync::broadcast;
use tokio::time::timeout;

async fn next_event(
    rx: &mut broadcast::Receiver<ControlEvent>,
    event_type: &str,
) -> ControlEvent {
    timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.event_type == event_type {
                return event;
            }
        }
    })
    .await
    .expect("event not received")
}

#[tokio::test]
async fn test_authenticated_handshake_and_request() {
    let obs = MockObs::start(Some("supersecretpassword")).await;
    let client = ObsClient::new(obs.config("supersecretpassword"));
    let mut events = client.subscribe_events().unwrap();

    let data = client.call("GetCurrentProgramScene", None).await.unwrap();
    assert_eq!(data["currentProgramSceneName"], "Main");
    assert_eq!(client.state(), ConnectionState::Connected);

    let identified = next_event(&mut events, ControlEvent::IDENTIFIED).await;
    assert!(identified.data.is_null());
}

#[tokio::test]
async fn test_wrong_password_is_unreachable() {
    let obs = MockObs::start(Some("supersecretpassword")).await;
    let client = ObsClient::new(obs.config("guess"));

    let result = client.call("GetVersion", None).await;
    assert!(matches!(result, Err(ControlError::Unreachable(_))));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_capabilities_from_available_requests() {
    let obs = MockObs::start(None).await;
    let client = ObsClient::new(obs.config(""));

    client.connect().await.unwrap();
    assert!(client.supports("GetCurrentProgramScene"));
    assert!(!client.supports("GetReplayBufferStatus"));
}

#[tokio::test]
async fn test_unknown_request_is_rejection() {
    let obs = MockObs::start(None).await;
    let client = ObsClient::new(obs.config(""));

    let err = client.call("GetReplayBufferStatus", None).await.unwrap_err();
    assert!(err.is_rejection());
    assert!(matches!(err, ControlError::RequestFailed { code: 204, .. }));
}

#[tokio::test]
async fn test_command_produces_event() {
    let obs = MockObs::start(None).await;
    let client = ObsClient::new(obs.config(""));
    let mut events = client.subscribe_events().unwrap();

    client
        .call("SetCurrentProgramScene", Some(json!({"sceneName": "BRB"})))
        .await
        .unwrap();
    assert_eq!(obs.current_scene(), "BRB");

    let event = next_event(&mut events, "CurrentProgramSceneChanged").await;
    assert_eq!(event.data["sceneName"], "BRB");
}

#[tokio::test]
async fn test_reconnects_on_next_call_after_session_loss() {
    let obs = MockObs::start(None).await;
    let client = ObsClient::new(obs.config(""));
    let mut events = client.subscribe_events().unwrap();

    client.call("GetVersion", None).await.unwrap();
    next_event(&mut events, ControlEvent::IDENTIFIED).await;

    obs.disconnect_all();
    timeout(Duration::from_secs(2), async {
        while client.is_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("session loss not detected");

    let data = client.call("GetCurrentProgramScene", None).await.unwrap();
    assert_eq!(data["sceneName"], "Main");
    assert_eq!(obs.connection_count(), 2);
    next_event(&mut events, ControlEvent::IDENTIFIED).await;
}
