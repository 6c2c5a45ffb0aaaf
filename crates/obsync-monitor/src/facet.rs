//! Facet definitions and the built-in OBS facet set.
//!
//! A facet pairs a `FacetKind` with the fetch function that reads its current
//! value from the control client. The built-in set covers every `FacetKind`
//! and is filtered once, at registration, by what the client supports.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use obsync_core::{
    BoxFuture, ControlError, ControlResult, DynControlClient, FacetKind, OutputState,
    OutputStatePayload, StreamState,
};
use serde_json::{json, Value};
use tracing::info;

/// Fetch function of a facet.
pub type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, ControlResult<Value>> + Send + Sync>;

/// One tracked facet.
#[derive(Clone)]
pub struct Facet {
    kind: FacetKind,
    fetch: FetchFn,
}

impl Facet {
    pub fn new<F, Fut>(kind: FacetKind, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ControlResult<Value>> + Send + 'static,
    {
        Self {
            kind,
            fetch: Arc::new(move || Box::pin(fetch())),
        }
    }

    pub fn kind(&self) -> FacetKind {
        self.kind
    }

    pub async fn fetch(&self) -> ControlResult<Value> {
        (self.fetch)().await
    }
}

impl fmt::Debug for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facet").field("kind", &self.kind).finish()
    }
}

/// Requests a facet cannot work without.
pub fn required_requests(kind: FacetKind) -> &'static [&'static str] {
    match kind {
        FacetKind::Scene => &["GetCurrentProgramScene"],
        FacetKind::Profile => &["GetProfileList"],
        FacetKind::Collection => &["GetSceneCollectionList"],
        FacetKind::StreamStatus => &["GetStreamStatus", "GetRecordStatus"],
        FacetKind::VideoSettings => &["GetVideoSettings"],
        FacetKind::ReplayBuffer => &["GetReplayBufferStatus"],
        FacetKind::VirtualCamera => &["GetVirtualCamStatus"],
    }
}

/// Build the facets the client supports, in `FacetKind::ALL` order.
pub fn obs_facets(client: DynControlClient) -> Vec<Facet> {
    FacetKind::ALL
        .iter()
        .copied()
        .filter(|kind| {
            let supported = required_requests(*kind)
                .iter()
                .all(|request| client.supports(request));
            if !supported {
                info!(facet = %kind, "Control client lacks support, facet not registered");
            }
            supported
        })
        .map(|kind| obs_facet(kind, client.clone()))
        .collect()
}

/// Build a single built-in facet.
pub fn obs_facet(kind: FacetKind, client: DynControlClient) -> Facet {
    match kind {
        FacetKind::Scene => Facet::new(kind, move || {
            let client = client.clone();
            async move {
                let data = client.call("GetCurrentProgramScene", None).await?;
                let scene = str_field(&data, "currentProgramSceneName")
                    .or_else(|_| str_field(&data, "sceneName"))?;
                Ok(json!({ "scene": scene }))
            }
        }),
        FacetKind::Profile => Facet::new(kind, move || {
            let client = client.clone();
            async move {
                let data = client.call("GetProfileList", None).await?;
                Ok(json!({ "profile": str_field(&data, "currentProfileName")? }))
            }
        }),
        FacetKind::Collection => Facet::new(kind, move || {
            let client = client.clone();
            async move {
                let data = client.call("GetSceneCollectionList", None).await?;
                Ok(json!({ "collection": str_field(&data, "currentSceneCollectionName")? }))
            }
        }),
        FacetKind::StreamStatus => {
            Facet::new(kind, move || {
                let client = client.clone();
                async move {
                    // Checked per fetch: capabilities may load after registration.
                    let has_replay = client.supports("GetReplayBufferStatus");
                    let has_virtual_cam = client.supports("GetVirtualCamStatus");
                    let stream = client.call("GetStreamStatus", None).await?;
                    let record = client.call("GetRecordStatus", None).await?;
                    let replay_buffer_active = if has_replay {
                        output_active(&client, "GetReplayBufferStatus").await?
                    } else {
                        false
                    };
                    let virtual_camera_active = if has_virtual_cam {
                        output_active(&client, "GetVirtualCamStatus").await?
                    } else {
                        false
                    };

                    let state = StreamState {
                        streaming: bool_field(&stream, "outputActive")?,
                        recording: bool_field(&record, "outputActive")?,
                        recording_paused: bool_field(&record, "outputPaused").unwrap_or(false),
                        replay_buffer_active,
                        virtual_camera_active,
                    };
                    Ok(serde_json::to_value(state)?)
                }
            })
        }
        FacetKind::VideoSettings => Facet::new(kind, move || {
            let client = client.clone();
            async move {
                let settings = client.call("GetVideoSettings", None).await?;
                Ok(json!({ "settings": settings }))
            }
        }),
        FacetKind::ReplayBuffer => Facet::new(kind, move || {
            let client = client.clone();
            async move { output_state(&client, "GetReplayBufferStatus").await }
        }),
        FacetKind::VirtualCamera => Facet::new(kind, move || {
            let client = client.clone();
            async move { output_state(&client, "GetVirtualCamStatus").await }
        }),
    }
}

/// Read `outputActive` from an optional output.
///
/// OBS rejects status requests for outputs that are not configured (e.g. no
/// replay buffer set up); that reads as inactive rather than as a failure.
async fn output_active(client: &DynControlClient, request_type: &str) -> ControlResult<bool> {
    match client.call(request_type, None).await {
        Ok(data) => bool_field(&data, "outputActive"),
        Err(e) if e.is_rejection() => Ok(false),
        Err(e) => Err(e),
    }
}

async fn output_state(client: &DynControlClient, request_type: &str) -> ControlResult<Value> {
    let active = output_active(client, request_type).await?;
    Ok(serde_json::to_value(OutputStatePayload {
        state: OutputState::from_active(active),
    })?)
}

fn str_field(data: &Value, key: &str) -> ControlResult<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ControlError::Protocol(format!("missing string field {key}")))
}

fn bool_field(data: &Value, key: &str) -> ControlResult<bool> {
    data.get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| ControlError::Protocol(format!("missing bool field {key}")))
}
