//! Control capability for the externally controlled device.
//!
//! The rest of obsync only ever talks to OBS through [`ControlClient`]:
//! - the monitor uses it to fetch facet values
//! - the dashboard command handlers use it to issue commands
//! - tests substitute `MockControlClient` (`mock` feature)

use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ControlResult;
use crate::message::StatusSnapshot;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Native change notification pushed by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlEvent {
    /// Event name (e.g. "CurrentProgramSceneChanged").
    pub event_type: String,
    /// Event data, `Value::Null` when the event carries none.
    pub data: Value,
}

impl ControlEvent {
    /// Event type emitted by a control transport after it (re)establishes
    /// its session. Anything cached from push events may be stale by then.
    pub const IDENTIFIED: &'static str = "Identified";

    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// RPC-style access to the controlled device.
pub trait ControlClient: Send + Sync {
    /// Issue one request and return its response data.
    fn call(&self, request_type: &str, params: Option<Value>)
        -> BoxFuture<'_, ControlResult<Value>>;

    /// Whether the device supports a request type.
    ///
    /// Queried once when facets are registered, not per call.
    fn supports(&self, _request_type: &str) -> bool {
        true
    }

    /// Subscribe to native change notifications, if the transport has them.
    fn subscribe_events(&self) -> Option<broadcast::Receiver<ControlEvent>> {
        None
    }
}

/// Arc wrapper for ControlClient trait objects.
pub type DynControlClient = Arc<dyn ControlClient>;

impl<C: ControlClient + ?Sized> ControlClient for Arc<C> {
    fn call(
        &self,
        request_type: &str,
        params: Option<Value>,
    ) -> BoxFuture<'_, ControlResult<Value>> {
        (**self).call(request_type, params)
    }

    fn supports(&self, request_type: &str) -> bool {
        (**self).supports(request_type)
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ControlEvent>> {
        (**self).subscribe_events()
    }
}

/// Read access to the current state, for snapshots sent to new clients.
pub trait SnapshotProvider: Send + Sync {
    fn snapshot(&self) -> StatusSnapshot;
}
