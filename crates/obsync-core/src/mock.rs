//! Scripted control client for tests.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::control::{BoxFuture, ControlClient, ControlEvent};
use crate::error::{ControlError, ControlResult};

/// Request status code OBS uses for unknown request types.
const UNKNOWN_REQUEST_CODE: u32 = 204;

#[derive(Debug, Clone)]
enum Reply {
    Ok(Value),
    Reject(u32, String),
    Unreachable,
    Hang,
}

/// Mock control client.
///
/// Replies are scripted per request type; unscripted requests are rejected
/// the way OBS rejects unknown request types.
#[derive(Debug)]
pub struct MockControlClient {
    replies: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    supported: Mutex<Option<HashSet<String>>>,
    events: Option<broadcast::Sender<ControlEvent>>,
}

impl Default for MockControlClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockControlClient {
    /// Create a mock without push notifications.
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            supported: Mutex::new(None),
            events: None,
        }
    }

    /// Create a mock that offers a push notification channel.
    pub fn with_events() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            events: Some(tx),
            ..Self::new()
        }
    }

    pub fn set_response(&self, request_type: &str, data: Value) {
        self.replies
            .lock()
            .insert(request_type.to_string(), Reply::Ok(data));
    }

    /// Make a request fail as a rejection (device reachable).
    pub fn set_rejection(&self, request_type: &str, code: u32, comment: &str) {
        self.replies.lock().insert(
            request_type.to_string(),
            Reply::Reject(code, comment.to_string()),
        );
    }

    /// Make a request fail as if the device were unreachable.
    pub fn set_unreachable(&self, request_type: &str) {
        self.replies
            .lock()
            .insert(request_type.to_string(), Reply::Unreachable);
    }

    /// Make a request never complete.
    pub fn set_hang(&self, request_type: &str) {
        self.replies
            .lock()
            .insert(request_type.to_string(), Reply::Hang);
    }

    /// Restrict the supported request types (default: everything).
    pub fn set_supported(&self, request_types: &[&str]) {
        *self.supported.lock() = Some(request_types.iter().map(|s| s.to_string()).collect());
    }

    /// Push a native change notification to subscribers.
    ///
    /// Returns the number of subscribers reached.
    pub fn emit_event(&self, event: ControlEvent) -> usize {
        self.events
            .as_ref()
            .and_then(|tx| tx.send(event).ok())
            .unwrap_or(0)
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> Vec<(String, Option<Value>)> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls for one request type.
    pub fn call_count(&self, request_type: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(t, _)| t == request_type)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl ControlClient for MockControlClient {
    fn call(
        &self,
        request_type: &str,
        params: Option<Value>,
    ) -> BoxFuture<'_, ControlResult<Value>> {
        self.calls
            .lock()
            .push((request_type.to_string(), params));
        let reply = self.replies.lock().get(request_type).cloned();
        let request_type = request_type.to_string();

        Box::pin(async move {
            match reply {
                Some(Reply::Ok(data)) => Ok(data),
                Some(Reply::Reject(code, comment)) => {
                    Err(ControlError::RequestFailed { code, comment })
                }
                Some(Reply::Unreachable) => {
                    Err(ControlError::Unreachable("mock device offline".to_string()))
                }
                Some(Reply::Hang) => std::future::pending().await,
                None => Err(ControlError::RequestFailed {
                    code: UNKNOWN_REQUEST_CODE,
                    comment: format!("Unknown request type: {request_type}"),
                }),
            }
        })
    }

    fn supports(&self, request_type: &str) -> bool {
        self.supported
            .lock()
            .as_ref()
            .map_or(true, |set| set.contains(request_type))
    }

    fn subscribe_events(&self) -> Option<broadcast::Receiver<ControlEvent>> {
        self.events.as_ref().map(|tx| tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unscripted_request_is_rejected() {
        let mock = MockControlClient::new();
        let err = mock.call("GetStats", None).await.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(mock.call_count("GetStats"), 1);
    }

    #[tokio::test]
    async fn test_records_params() {
        let mock = MockControlClient::new();
        mock.set_response("SetCurrentProgramScene", Value::Null);
        mock.call("SetCurrentProgramScene", Some(json!({"sceneName": "BRB"})))
            .await
            .unwrap();
        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, Some(json!({"sceneName": "BRB"})));
    }

    #[test]
    fn test_supported_set() {
        let mock = MockControlClient::new();
        assert!(mock.supports("GetVideoSettings"));
        mock.set_supported(&["GetStreamStatus"]);
        assert!(mock.supports("GetStreamStatus"));
        assert!(!mock.supports("GetVideoSettings"));
    }

    #[test]
    fn test_events_only_when_enabled() {
        assert!(MockControlClient::new().subscribe_events().is_none());
        let mock = MockControlClient::with_events();
        let mut rx = mock.subscribe_events().unwrap();
        assert_eq!(mock.emit_event(ControlEvent::new("StreamStateChanged", Value::Null)), 1);
        assert_eq!(rx.try_recv().unwrap().event_type, "StreamStateChanged");
    }
}
