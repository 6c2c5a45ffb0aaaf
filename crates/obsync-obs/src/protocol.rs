//! obs-websocket 5.x frames.

use std::net::IpAddr;

use base64::Engine;
use obsync_core::{ControlError, ControlEvent, ControlResult};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Negotiated RPC version.
pub const RPC_VERSION: u32 = 1;

/// Op codes.
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

/// Event subscription bits.
pub mod subscription {
    pub const GENERAL: u32 = 1 << 0;
    pub const CONFIG: u32 = 1 << 1;
    pub const SCENES: u32 = 1 << 2;
    pub const OUTPUTS: u32 = 1 << 6;
}

/// Events the monitor reacts to.
pub const EVENT_SUBSCRIPTIONS: u32 =
    subscription::GENERAL | subscription::CONFIG | subscription::SCENES | subscription::OUTPUTS;

/// Any frame: `{op, d}`.
#[derive(Debug, Deserialize)]
pub struct Frame {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Response data, or the rejection OBS reported.
    pub fn into_result(self) -> ControlResult<Value> {
        if self.request_status.result {
            Ok(self.response_data.unwrap_or(Value::Null))
        } else {
            Err(ControlError::RequestFailed {
                code: self.request_status.code,
                comment: self.request_status.comment.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Option<Value>,
}

impl From<Event> for ControlEvent {
    fn from(event: Event) -> Self {
        ControlEvent::new(event.event_type, event.event_data.unwrap_or(Value::Null))
    }
}

/// Authentication string: `base64(sha256(base64(sha256(password + salt)) + challenge))`.
pub fn auth_string(password: &str, challenge: &str, salt: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let secret = engine.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    engine.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

/// Identify frame answering a Hello.
pub fn identify(hello: &Hello, password: Option<&str>) -> ControlResult<Value> {
    let mut d = json!({
        "rpcVersion": RPC_VERSION,
        "eventSubscriptions": EVENT_SUBSCRIPTIONS,
    });

    if let Some(auth) = &hello.authentication {
        let password = password.ok_or_else(|| {
            ControlError::Protocol("OBS requires a password but none is configured".into())
        })?;
        d["authentication"] = json!(auth_string(password, &auth.challenge, &auth.salt));
    }

    Ok(json!({ "op": op::IDENTIFY, "d": d }))
}

/// Request frame.
pub fn request(request_id: &str, request_type: &str, params: Option<Value>) -> Value {
    let mut d = json!({
        "requestType": request_type,
        "requestId": request_id,
    });
    if let Some(params) = params {
        d["requestData"] = params;
    }
    json!({ "op": op::REQUEST, "d": d })
}

/// Only connect to OBS on this machine or the local network.
pub fn validate_host(host: &str) -> ControlResult<()> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(());
    }

    let addr: IpAddr = host
        .parse()
        .map_err(|_| ControlError::Unreachable(format!("invalid OBS host address: {host}")))?;

    let is_local = match addr {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_loopback(),
    };

    if is_local {
        Ok(())
    } else {
        Err(ControlError::Unreachable(format!(
            "OBS host must be on a private or local network, got {host}"
        )))
    }
}
