//! Local mirror of server state.

use obsync_core::{OutputState, StatusSnapshot, StreamState};
use serde::Serialize;
use serde_json::Value;

use crate::lifecycle::ConnectionStatus;

/// One cell per facet plus the connection status.
///
/// Only the dispatch table writes facet cells; UI code issues commands
/// instead of mutating them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub connection: ConnectionStatus,
    pub protocol_version: Option<u32>,
    pub scene: Option<String>,
    pub profile: Option<String>,
    pub collection: Option<String>,
    pub stream: Option<StreamState>,
    pub video_settings: Option<Value>,
    pub replay_buffer: Option<OutputState>,
    pub virtual_camera: Option<OutputState>,
    /// Last `Error` message from the server.
    pub server_error: Option<String>,
}

impl ClientState {
    /// Replace every facet cell with the snapshot's values.
    pub fn apply_snapshot(&mut self, snapshot: StatusSnapshot) {
        self.protocol_version = Some(snapshot.protocol_version);
        self.scene = snapshot.scene;
        self.profile = snapshot.profile;
        self.collection = snapshot.collection;
        self.stream = snapshot.stream;
        self.video_settings = snapshot.video_settings;
        self.replay_buffer = snapshot.replay_buffer;
        self.virtual_camera = snapshot.virtual_camera;
    }
}
