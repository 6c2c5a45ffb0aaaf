//! Tracked facets of OBS state and their payload types.
//!
//! A facet's value is stored and compared as a `serde_json::Value`; the
//! structs here are the typed shape of that value, and double as the payload
//! of the matching change message.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One independently tracked piece of OBS state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FacetKind {
    Scene,
    Profile,
    Collection,
    StreamStatus,
    VideoSettings,
    ReplayBuffer,
    VirtualCamera,
}

impl FacetKind {
    /// Every facet, in polling order.
    pub const ALL: [FacetKind; 7] = [
        FacetKind::Scene,
        FacetKind::Profile,
        FacetKind::Collection,
        FacetKind::StreamStatus,
        FacetKind::VideoSettings,
        FacetKind::ReplayBuffer,
        FacetKind::VirtualCamera,
    ];

    /// Stable facet name (used in logs and metric labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Profile => "profile",
            Self::Collection => "collection",
            Self::StreamStatus => "streamStatus",
            Self::VideoSettings => "videoSettings",
            Self::ReplayBuffer => "replayBuffer",
            Self::VirtualCamera => "virtualCamera",
        }
    }

    /// Message type broadcast when this facet changes.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::Scene => "CurrentSceneChanged",
            Self::Profile => "ProfileChanged",
            Self::Collection => "SceneCollectionChanged",
            Self::StreamStatus => "StreamStateChanged",
            Self::VideoSettings => "VideoSettingsChanged",
            Self::ReplayBuffer => "ReplayBufferStateChanged",
            Self::VirtualCamera => "VirtualCameraStateChanged",
        }
    }
}

impl fmt::Display for FacetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenePayload {
    pub scene: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPayload {
    pub collection: String,
}

/// Output status bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamState {
    pub streaming: bool,
    pub recording: bool,
    pub recording_paused: bool,
    pub replay_buffer_active: bool,
    pub virtual_camera_active: bool,
}

/// Video settings as reported by OBS (kept opaque).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSettingsPayload {
    pub settings: Value,
}

/// State of a single optional output (replay buffer, virtual camera).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputState {
    Active,
    Inactive,
}

impl OutputState {
    pub fn from_active(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Inactive
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStatePayload {
    pub state: OutputState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_state_uses_camel_case() {
        let state = StreamState {
            recording_paused: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["recordingPaused"], true);
        assert_eq!(json["virtualCameraActive"], false);
    }

    #[test]
    fn test_output_state_lowercase() {
        let payload = OutputStatePayload {
            state: OutputState::from_active(true),
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"state":"active"}"#
        );
    }

    #[test]
    fn test_facet_names_are_unique() {
        let mut names: Vec<_> = FacetKind::ALL.iter().map(|f| f.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FacetKind::ALL.len());
    }
}
