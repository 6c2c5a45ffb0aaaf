//! Bounded control calls.
//!
//! A hung request would otherwise stall the facet (or command) waiting on it
//! indefinitely. `TimeoutControl` turns that into an ordinary
//! `ControlError::Timeout`.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::control::{BoxFuture, ControlClient, ControlEvent};
use crate::error::{ControlError, ControlResult};

/// Default per-call timeout.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_millis(5000);

/// Wraps a control client, bounding every call with a timeout.
pub struct TimeoutControl<C> {
    inner: C,
    timeout: Duration,
}

impl<C> TimeoutControl<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: ControlClient> ControlClient for TimeoutControl<C> {
    fn call(
        &self,
        request_type: &str,
        params: Option<Value>,
    ) -> BoxFuture<'_, ControlResult<Value>> {
        let request_type = request_type.to_string();
        Box::pin(async move {
            let call = self.inner.call(&request_type, params);
            match tokio::time::timeout(self.timeout, call).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%request_type, timeout_ms = self.timeout.as_millis() as u64, "Control call timed out");
                    Err(ControlError::Timeout {
                        request_type,
                        timeout_ms: self.timeout.as_millis() as u64,
                    })
                }
            }
        })
    }

    fn supports(&self, request_type: &str) -> bool {
        self.inner.supports(request_type)
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ControlEvent>> {
        self.inner.subscribe_events()
    }
}
