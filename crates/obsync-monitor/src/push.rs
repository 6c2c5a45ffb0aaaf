//! Push bindings: native change notifications mapped to facets.

use obsync_core::{FacetKind, OutputState, OutputStatePayload};
use serde_json::{json, Value};

/// How a push event updates its facet.
#[derive(Debug, Clone, Copy)]
pub enum PushAction {
    /// Derive the new facet value from the event data; refetch if the data
    /// does not have the expected shape.
    Extract(fn(&Value) -> Option<Value>),
    /// Refetch the facet immediately.
    Refetch,
}

/// Maps one event type to one facet.
#[derive(Debug, Clone, Copy)]
pub struct PushBinding {
    pub event_type: &'static str,
    pub facet: FacetKind,
    pub action: PushAction,
}

impl PushBinding {
    pub fn extract(
        event_type: &'static str,
        facet: FacetKind,
        f: fn(&Value) -> Option<Value>,
    ) -> Self {
        Self {
            event_type,
            facet,
            action: PushAction::Extract(f),
        }
    }

    pub fn refetch(event_type: &'static str, facet: FacetKind) -> Self {
        Self {
            event_type,
            facet,
            action: PushAction::Refetch,
        }
    }
}

/// Bindings for the obs-websocket event stream.
///
/// Video settings have no change event and stay on the poll path.
pub fn obs_push_bindings() -> Vec<PushBinding> {
    vec![
        PushBinding::extract("CurrentProgramSceneChanged", FacetKind::Scene, scene_from_event),
        PushBinding::extract("CurrentProfileChanged", FacetKind::Profile, profile_from_event),
        PushBinding::extract(
            "CurrentSceneCollectionChanged",
            FacetKind::Collection,
            collection_from_event,
        ),
        PushBinding::refetch("StreamStateChanged", FacetKind::StreamStatus),
        PushBinding::refetch("RecordStateChanged", FacetKind::StreamStatus),
        PushBinding::refetch("ReplayBufferStateChanged", FacetKind::StreamStatus),
        PushBinding::extract(
            "ReplayBufferStateChanged",
            FacetKind::ReplayBuffer,
            output_state_from_event,
        ),
        PushBinding::refetch("VirtualcamStateChanged", FacetKind::StreamStatus),
        PushBinding::extract(
            "VirtualcamStateChanged",
            FacetKind::VirtualCamera,
            output_state_from_event,
        ),
    ]
}

fn scene_from_event(data: &Value) -> Option<Value> {
    let scene = data.get("sceneName")?.as_str()?;
    Some(json!({ "scene": scene }))
}

fn profile_from_event(data: &Value) -> Option<Value> {
    let profile = data.get("profileName")?.as_str()?;
    Some(json!({ "profile": profile }))
}

fn collection_from_event(data: &Value) -> Option<Value> {
    let collection = data.get("sceneCollectionName")?.as_str()?;
    Some(json!({ "collection": collection }))
}

fn output_state_from_event(data: &Value) -> Option<Value> {
    let active = data.get("outputActive")?.as_bool()?;
    serde_json::to_value(OutputStatePayload {
        state: OutputState::from_active(active),
    })
    .ok()
}
