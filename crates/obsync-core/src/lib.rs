//! Core types for the obsync state-synchronization layer.
//!
//! This crate provides the vocabulary shared by every other obsync crate:
//! - `FacetKind` and the facet payload types
//! - `ServerMessage` / `Envelope`: the typed dashboard protocol
//! - `ControlClient`: the capability used to talk to OBS
//! - `TimeoutControl`: bounded RPC calls
//! - `MockControlClient`: scripted control client for tests (`mock` feature)

pub mod control;
pub mod error;
pub mod facet;
pub mod message;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod timeout;

pub use control::{BoxFuture, ControlClient, ControlEvent, DynControlClient, SnapshotProvider};
pub use error::{ControlError, ControlResult};
pub use facet::{
    CollectionPayload, FacetKind, OutputState, OutputStatePayload, ProfilePayload, ScenePayload,
    StreamState, VideoSettingsPayload,
};
pub use message::{
    command, Envelope, ErrorPayload, ServerMessage, StatusSnapshot, PROTOCOL_VERSION,
};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockControlClient;
pub use timeout::TimeoutControl;
