//! Typed dispatch of inbound messages.

use std::collections::HashMap;

use obsync_core::{
    CollectionPayload, Envelope, ErrorPayload, OutputStatePayload, ProfilePayload, ScenePayload,
    StatusSnapshot, StreamState, VideoSettingsPayload,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::state::ClientState;

/// Applies one message payload to the state. Must not touch the state unless
/// the payload parsed.
pub type Handler = fn(&mut ClientState, Value) -> serde_json::Result<()>;

/// Result of dispatching one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied(String),
    /// Unknown `type`; ignored.
    Unknown(String),
    /// Known `type` with a payload of the wrong shape; ignored.
    BadPayload(String),
    /// Not an envelope at all.
    Malformed,
}

/// `type -> handler` table.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    handlers: HashMap<&'static str, Handler>,
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Handlers for the full server message vocabulary.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register("ServerStatus", |state, payload| {
            let snapshot: StatusSnapshot = serde_json::from_value(payload)?;
            state.apply_snapshot(snapshot);
            Ok(())
        });
        table.register("CurrentSceneChanged", |state, payload| {
            let p: ScenePayload = serde_json::from_value(payload)?;
            state.scene = Some(p.scene);
            Ok(())
        });
        table.register("ProfileChanged", |state, payload| {
            let p: ProfilePayload = serde_json::from_value(payload)?;
            state.profile = Some(p.profile);
            Ok(())
        });
        table.register("SceneCollectionChanged", |state, payload| {
            let p: CollectionPayload = serde_json::from_value(payload)?;
            state.collection = Some(p.collection);
            Ok(())
        });
        table.register("StreamStateChanged", |state, payload| {
            let p: StreamState = serde_json::from_value(payload)?;
            state.stream = Some(p);
            Ok(())
        });
        table.register("VideoSettingsChanged", |state, payload| {
            let p: VideoSettingsPayload = serde_json::from_value(payload)?;
            state.video_settings = Some(p.settings);
            Ok(())
        });
        table.register("ReplayBufferStateChanged", |state, payload| {
            let p: OutputStatePayload = serde_json::from_value(payload)?;
            state.replay_buffer = Some(p.state);
            Ok(())
        });
        table.register("VirtualCameraStateChanged", |state, payload| {
            let p: OutputStatePayload = serde_json::from_value(payload)?;
            state.virtual_camera = Some(p.state);
            Ok(())
        });
        table.register("Error", |state, payload| {
            let p: ErrorPayload = serde_json::from_value(payload)?;
            state.server_error = Some(p.error_message);
            Ok(())
        });
        table
    }

    pub fn register(&mut self, message_type: &'static str, handler: Handler) {
        self.handlers.insert(message_type, handler);
    }

    pub fn handles(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Handled message types, sorted.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Parse one text frame and apply it.
    pub fn dispatch(&self, state: &mut ClientState, raw: &str) -> DispatchOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed server frame");
                return DispatchOutcome::Malformed;
            }
        };

        let Some(handler) = self.handlers.get(envelope.kind.as_str()) else {
            warn!(message_type = %envelope.kind, "Ignoring unknown message type");
            return DispatchOutcome::Unknown(envelope.kind);
        };

        match handler(state, envelope.payload) {
            Ok(()) => {
                debug!(message_type = %envelope.kind, "Applied server message");
                DispatchOutcome::Applied(envelope.kind)
            }
            Err(e) => {
                warn!(message_type = %envelope.kind, error = %e, "Ignoring message with bad payload");
                DispatchOutcome::BadPayload(envelope.kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obsync_core::{OutputState, ServerMessage};
    use serde_json::json;

    fn populated() -> ClientState {
        let mut state = ClientState::default();
        DispatchTable::standard().dispatch(
            &mut state,
            &json!({
                "type": "ServerStatus",
                "payload": {
                    "protocolVersion": 1,
                    "scene": "Main",
                    "profile": "Default",
                    "collection": "Show",
                    "stream": {
                        "streaming": false,
                        "recording": true,
                        "recordingPaused": false,
                        "replayBufferActive": false,
                        "virtualCameraActive": false
                    },
                    "videoSettings": {"baseWidth": 1920},
                    "replayBuffer": "inactive",
                    "virtualCamera": null
                }
            })
            .to_string(),
        );
        state
    }

    #[test]
    fn test_snapshot_applied() {
        let state = populated();
        assert_eq!(state.protocol_version, Some(1));
        assert_eq!(state.scene.as_deref(), Some("Main"));
        assert!(state.stream.as_ref().unwrap().recording);
        assert_eq!(state.replay_buffer, Some(OutputState::Inactive));
        assert_eq!(state.virtual_camera, None);
    }

    #[test]
    fn test_every_server_message_has_a_handler() {
        let table = DispatchTable::standard();
        for facet in obsync_core::FacetKind::ALL {
            assert!(table.handles(facet.message_type()), "{facet}");
        }
        assert!(table.handles("ServerStatus"));
        assert!(table.handles("Error"));
    }

    #[test]
    fn test_change_message_applied() {
        let mut state = populated();
        let msg = ServerMessage::CurrentSceneChanged(ScenePayload {
            scene: "BRB".to_string(),
        });
        let outcome = DispatchTable::standard().dispatch(&mut state, &msg.to_json().unwrap());

        assert_eq!(outcome, DispatchOutcome::Applied("CurrentSceneChanged".to_string()));
        assert_eq!(state.scene.as_deref(), Some("BRB"));
        assert_eq!(state.profile.as_deref(), Some("Default"));
    }

    #[test]
    fn test_unknown_type_leaves_state_unchanged() {
        let mut state = populated();
        let before = state.clone();

        let outcome = DispatchTable::standard().dispatch(
            &mut state,
            r#"{"type": "HologramModeChanged", "payload": {"enabled": true}}"#,
        );

        assert_eq!(outcome, DispatchOutcome::Unknown("HologramModeChanged".to_string()));
        assert_eq!(state, before);
    }

    #[test]
    fn test_bad_payload_leaves_state_unchanged() {
        let mut state = populated();
        let before = state.clone();
        let table = DispatchTable::standard();

        let outcome = table.dispatch(
            &mut state,
            r#"{"type": "StreamStateChanged", "payload": {"streaming": "yes"}}"#,
        );
        assert_eq!(outcome, DispatchOutcome::BadPayload("StreamStateChanged".to_string()));
        assert_eq!(table.dispatch(&mut state, "garbage"), DispatchOutcome::Malformed);
        assert_eq!(state, before);
    }

    #[test]
    fn test_server_error_recorded() {
        let mut state = ClientState::default();
        DispatchTable::standard().dispatch(
            &mut state,
            &ServerMessage::error("Unknown command type: X").to_json().unwrap(),
        );
        assert_eq!(state.server_error.as_deref(), Some("Unknown command type: X"));
    }
}
