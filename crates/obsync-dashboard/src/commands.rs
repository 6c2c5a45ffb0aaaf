//! Dashboard command handlers.
//!
//! Commands are looked up by envelope `type` in an explicit table. Commands
//! that change OBS state reply with nothing: the change reaches every client
//! through the monitor once OBS reports it.

use std::collections::HashMap;
use std::sync::Arc;

use obsync_core::{command, BoxFuture, DynControlClient, ServerMessage, SnapshotProvider};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{CommandError, CommandResult};

/// What to do with a handler's result.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    /// Nothing to send.
    None,
    /// Send to the issuing client only.
    Reply(ServerMessage),
    /// Send to every client.
    Broadcast(ServerMessage),
}

/// Handler for one command type.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, payload: Value) -> BoxFuture<'_, CommandResult<CommandReply>>;
}

/// Forwards a command to one OBS request, copying the named string
/// parameters from the command payload.
pub struct ForwardCommand {
    control: DynControlClient,
    request_type: &'static str,
    params: &'static [&'static str],
}

impl ForwardCommand {
    pub fn new(
        control: DynControlClient,
        request_type: &'static str,
        params: &'static [&'static str],
    ) -> Self {
        Self {
            control,
            request_type,
            params,
        }
    }

    fn request_data(&self, payload: &Value) -> CommandResult<Option<Value>> {
        if self.params.is_empty() {
            return Ok(None);
        }

        let mut data = Map::new();
        for &param in self.params {
            let value = payload
                .get(param)
                .and_then(|v| v.as_str())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| CommandError::InvalidParams(format!("{param} is required")))?;
            data.insert(param.to_string(), json!(value));
        }
        Ok(Some(Value::Object(data)))
    }
}

impl CommandHandler for ForwardCommand {
    fn handle(&self, payload: Value) -> BoxFuture<'_, CommandResult<CommandReply>> {
        Box::pin(async move {
            let data = self.request_data(&payload)?;
            debug!(request_type = self.request_type, "Forwarding command to OBS");
            self.control.call(self.request_type, data).await?;
            Ok(CommandReply::None)
        })
    }
}

/// Replies with a full snapshot.
pub struct StatusCommand {
    snapshot: Arc<dyn SnapshotProvider>,
}

impl StatusCommand {
    pub fn new(snapshot: Arc<dyn SnapshotProvider>) -> Self {
        Self { snapshot }
    }
}

impl CommandHandler for StatusCommand {
    fn handle(&self, _payload: Value) -> BoxFuture<'_, CommandResult<CommandReply>> {
        let snapshot = self.snapshot.snapshot();
        Box::pin(async move { Ok(CommandReply::Reply(ServerMessage::ServerStatus(snapshot))) })
    }
}

/// Command table: `type -> handler`.
#[derive(Default, Clone)]
pub struct CommandRouter {
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        command_type: &'static str,
        handler: impl CommandHandler + 'static,
    ) -> Self {
        self.handlers.insert(command_type, Arc::new(handler));
        self
    }

    /// The built-in OBS command set.
    pub fn with_obs_commands(
        control: DynControlClient,
        snapshot: Arc<dyn SnapshotProvider>,
    ) -> Self {
        let forward = |request_type: &'static str, params: &'static [&'static str]| {
            ForwardCommand::new(control.clone(), request_type, params)
        };

        Self::new()
            .register(command::GET_SERVER_STATUS, StatusCommand::new(snapshot))
            .register(
                command::SET_CURRENT_SCENE,
                forward("SetCurrentProgramScene", &["sceneName"]),
            )
            .register(
                command::SET_CURRENT_PROFILE,
                forward("SetCurrentProfile", &["profileName"]),
            )
            .register(
                command::SET_CURRENT_SCENE_COLLECTION,
                forward("SetCurrentSceneCollection", &["sceneCollectionName"]),
            )
            .register(command::START_STREAM, forward("StartStream", &[]))
            .register(command::STOP_STREAM, forward("StopStream", &[]))
            .register(command::TOGGLE_STREAM, forward("ToggleStream", &[]))
            .register(command::START_RECORD, forward("StartRecord", &[]))
            .register(command::STOP_RECORD, forward("StopRecord", &[]))
            .register(command::TOGGLE_RECORD, forward("ToggleRecord", &[]))
            .register(command::PAUSE_RECORD, forward("PauseRecord", &[]))
            .register(command::RESUME_RECORD, forward("ResumeRecord", &[]))
            .register(command::TOGGLE_RECORD_PAUSE, forward("ToggleRecordPause", &[]))
            .register(command::START_REPLAY_BUFFER, forward("StartReplayBuffer", &[]))
            .register(command::STOP_REPLAY_BUFFER, forward("StopReplayBuffer", &[]))
            .register(command::TOGGLE_REPLAY_BUFFER, forward("ToggleReplayBuffer", &[]))
            .register(command::SAVE_REPLAY_BUFFER, forward("SaveReplayBuffer", &[]))
            .register(command::START_VIRTUAL_CAM, forward("StartVirtualCam", &[]))
            .register(command::STOP_VIRTUAL_CAM, forward("StopVirtualCam", &[]))
            .register(command::TOGGLE_VIRTUAL_CAM, forward("ToggleVirtualCam", &[]))
    }

    /// Registered name matching `command_type`, if any.
    pub fn resolve(&self, command_type: &str) -> Option<&'static str> {
        self.handlers.get_key_value(command_type).map(|(k, _)| *k)
    }

    /// Registered command types, sorted.
    pub fn command_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub async fn dispatch(&self, command_type: &str, payload: Value) -> CommandResult<CommandReply> {
        let handler = self
            .handlers
            .get(command_type)
            .cloned()
            .ok_or_else(|| CommandError::Unknown(command_type.to_string()))?;
        handler.handle(payload).await
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRouter")
            .field("commands", &self.command_types())
            .finish()
    }
}
