//! Dashboard protocol messages.
//!
//! Every frame on the dashboard socket, in either direction, is a JSON
//! envelope `{"type": ..., "payload": {...}}`. Server-to-client frames are
//! modelled by the closed `ServerMessage` enum; client-to-server command
//! names live in [`command`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::facet::{
    CollectionPayload, FacetKind, OutputState, OutputStatePayload, ProfilePayload, ScenePayload,
    StreamState, VideoSettingsPayload,
};

/// Version of the message vocabulary, reported in every snapshot.
pub const PROTOCOL_VERSION: u32 = 1;

/// Untyped envelope, used to read the `type` before dispatching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Full dump of all known facet values (sent on connect).
///
/// Facets that have not been observed yet are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub protocol_version: u32,
    pub scene: Option<String>,
    pub profile: Option<String>,
    pub collection: Option<String>,
    pub stream: Option<StreamState>,
    pub video_settings: Option<Value>,
    pub replay_buffer: Option<OutputState>,
    pub virtual_camera: Option<OutputState>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            scene: None,
            profile: None,
            collection: None,
            stream: None,
            video_settings: None,
            replay_buffer: None,
            virtual_camera: None,
        }
    }
}

impl StatusSnapshot {
    /// Fill in one facet from its cached value.
    pub fn set_facet(&mut self, facet: FacetKind, value: &Value) -> serde_json::Result<()> {
        match facet {
            FacetKind::Scene => {
                let p: ScenePayload = serde_json::from_value(value.clone())?;
                self.scene = Some(p.scene);
            }
            FacetKind::Profile => {
                let p: ProfilePayload = serde_json::from_value(value.clone())?;
                self.profile = Some(p.profile);
            }
            FacetKind::Collection => {
                let p: CollectionPayload = serde_json::from_value(value.clone())?;
                self.collection = Some(p.collection);
            }
            FacetKind::StreamStatus => {
                self.stream = Some(serde_json::from_value(value.clone())?);
            }
            FacetKind::VideoSettings => {
                let p: VideoSettingsPayload = serde_json::from_value(value.clone())?;
                self.video_settings = Some(p.settings);
            }
            FacetKind::ReplayBuffer => {
                let p: OutputStatePayload = serde_json::from_value(value.clone())?;
                self.replay_buffer = Some(p.state);
            }
            FacetKind::VirtualCamera => {
                let p: OutputStatePayload = serde_json::from_value(value.clone())?;
                self.virtual_camera = Some(p.state);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_message: String,
}

/// Server-to-client message vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    ServerStatus(StatusSnapshot),
    CurrentSceneChanged(ScenePayload),
    ProfileChanged(ProfilePayload),
    SceneCollectionChanged(CollectionPayload),
    StreamStateChanged(StreamState),
    VideoSettingsChanged(VideoSettingsPayload),
    ReplayBufferStateChanged(OutputStatePayload),
    VirtualCameraStateChanged(OutputStatePayload),
    Error(ErrorPayload),
}

impl ServerMessage {
    /// Build the change message for a facet from its new value.
    pub fn from_change(facet: FacetKind, value: &Value) -> serde_json::Result<Self> {
        let value = value.clone();
        Ok(match facet {
            FacetKind::Scene => Self::CurrentSceneChanged(serde_json::from_value(value)?),
            FacetKind::Profile => Self::ProfileChanged(serde_json::from_value(value)?),
            FacetKind::Collection => Self::SceneCollectionChanged(serde_json::from_value(value)?),
            FacetKind::StreamStatus => Self::StreamStateChanged(serde_json::from_value(value)?),
            FacetKind::VideoSettings => Self::VideoSettingsChanged(serde_json::from_value(value)?),
            FacetKind::ReplayBuffer => {
                Self::ReplayBufferStateChanged(serde_json::from_value(value)?)
            }
            FacetKind::VirtualCamera => {
                Self::VirtualCameraStateChanged(serde_json::from_value(value)?)
            }
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            error_message: message.into(),
        })
    }

    /// Wire name of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ServerStatus(_) => "ServerStatus",
            Self::CurrentSceneChanged(_) => FacetKind::Scene.message_type(),
            Self::ProfileChanged(_) => FacetKind::Profile.message_type(),
            Self::SceneCollectionChanged(_) => FacetKind::Collection.message_type(),
            Self::StreamStateChanged(_) => FacetKind::StreamStatus.message_type(),
            Self::VideoSettingsChanged(_) => FacetKind::VideoSettings.message_type(),
            Self::ReplayBufferStateChanged(_) => FacetKind::ReplayBuffer.message_type(),
            Self::VirtualCameraStateChanged(_) => FacetKind::VirtualCamera.message_type(),
            Self::Error(_) => "Error",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Client-to-server command names.
pub mod command {
    pub const GET_SERVER_STATUS: &str = "GetServerStatus";
    pub const SET_CURRENT_SCENE: &str = "SetCurrentScene";
    pub const SET_CURRENT_PROFILE: &str = "SetCurrentProfile";
    pub const SET_CURRENT_SCENE_COLLECTION: &str = "SetCurrentSceneCollection";
    pub const START_STREAM: &str = "StartStream";
    pub const STOP_STREAM: &str = "StopStream";
    pub const TOGGLE_STREAM: &str = "ToggleStream";
    pub const START_RECORD: &str = "StartRecord";
    pub const STOP_RECORD: &str = "StopRecord";
    pub const TOGGLE_RECORD: &str = "ToggleRecord";
    pub const PAUSE_RECORD: &str = "PauseRecord";
    pub const RESUME_RECORD: &str = "ResumeRecord";
    pub const TOGGLE_RECORD_PAUSE: &str = "ToggleRecordPause";
    pub const START_REPLAY_BUFFER: &str = "StartReplayBuffer";
    pub const STOP_REPLAY_BUFFER: &str = "StopReplayBuffer";
    pub const TOGGLE_REPLAY_BUFFER: &str = "ToggleReplayBuffer";
    pub const SAVE_REPLAY_BUFFER: &str = "SaveReplayBuffer";
    pub const START_VIRTUAL_CAM: &str = "StartVirtualCam";
    pub const STOP_VIRTUAL_CAM: &str = "StopVirtualCam";
    pub const TOGGLE_VIRTUAL_CAM: &str = "ToggleVirtualCam";
}
