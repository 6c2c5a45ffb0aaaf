//! Application wired to a real `ObsClient` talking to a mock OBS.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::mock_obs::MockObs;
use obsync_client::{ClientConfig, DashboardConnection};
use obsync_core::{FacetKind, SnapshotProvider};
use obsync_server::{AppConfig, Application};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;

fn app_config(obs: &MockObs) -> AppConfig {
    let mut config = AppConfig::default();
    config.obs = obs.config();
    config.monitor.poll_interval_ms = 20;
    config
}

async fn serve(app: Application) -> (String, tokio_util::sync::CancellationToken) {
    let shutdown = app.shutdown_token();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    tokio::spawn(app.serve(listener));
    (url, shutdown)
}

fn client(url: &str) -> Arc<DashboardConnection> {
    let conn = DashboardConnection::new(ClientConfig::new(url));
    conn.initialize();
    conn
}

async fn wait_for_scene(conn: &DashboardConnection, scene: &str) {
    let mut rx = conn.subscribe_state();
    timeout(
        Duration::from_secs(3),
        rx.wait_for(|s| s.scene.as_deref() == Some(scene)),
    )
    .await
    .unwrap_or_else(|_| panic!("scene {scene} never arrived"))
    .unwrap();
}

#[tokio::test]
async fn test_facets_follow_reported_capabilities() {
    let obs = MockObs::start().await;
    let app = Application::connect(app_config(&obs)).await.unwrap();

    assert_eq!(
        app.monitor().facet_kinds(),
        vec![FacetKind::Scene, FacetKind::VideoSettings]
    );
}

#[tokio::test]
async fn test_startup_snapshot_includes_push_facets() {
    let obs = MockObs::start().await;
    let app = Application::connect(app_config(&obs)).await.unwrap();
    let monitor = app.monitor().clone();
    let (url, shutdown) = serve(app).await;

    let conn = client(&url);
    wait_for_scene(&conn, "Main").await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(monitor.is_push_live());
    // Seeded once at startup, then left to events.
    assert_eq!(obs.scene_requests(), 1);
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.scene.as_deref(), Some("Main"));
    assert_eq!(snapshot.video_settings.unwrap()["baseWidth"], 1920);

    conn.shutdown();
    shutdown.cancel();
}

#[tokio::test]
async fn test_obs_scene_switch_reaches_clients() {
    let obs = MockObs::start().await;
    let app = Application::connect(app_config(&obs)).await.unwrap();
    let (url, shutdown) = serve(app).await;

    let a = client(&url);
    let b = client(&url);
    wait_for_scene(&a, "Main").await;
    wait_for_scene(&b, "Main").await;

    obs.switch_scene("Intermission");
    wait_for_scene(&a, "Intermission").await;
    wait_for_scene(&b, "Intermission").await;

    // Dashboard command goes through OBS and comes back as an event.
    tokio_test::assert_ok!(a.send("SetCurrentScene", json!({"sceneName": "BRB"})));
    wait_for_scene(&a, "BRB").await;
    wait_for_scene(&b, "BRB").await;
    assert_eq!(obs.scene_requests(), 1);

    a.shutdown();
    b.shutdown();
    shutdown.cancel();
}
