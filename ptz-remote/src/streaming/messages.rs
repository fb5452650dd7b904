//! OBS WebSocket v5 message shapes
//!
//! Every frame is `{"op": <code>, "d": {...}}`. Only the op codes the
//! session uses are modelled.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// RPC version this client speaks
pub const RPC_VERSION: u32 = 1;

pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    op: u8,
    #[serde(default)]
    d: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    #[serde(default)]
    pub negotiated_rpc_version: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_data: Option<Value>,
}

/// A frame received from the server
#[derive(Debug, Clone)]
pub enum Incoming {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
    Other(u8),
}

impl Incoming {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        Ok(match envelope.op {
            op::HELLO => Incoming::Hello(serde_json::from_value(envelope.d)?),
            op::IDENTIFIED => Incoming::Identified(serde_json::from_value(envelope.d)?),
            op::EVENT => Incoming::Event(serde_json::from_value(envelope.d)?),
            op::REQUEST_RESPONSE => {
                Incoming::RequestResponse(serde_json::from_value(envelope.d)?)
            }
            other => Incoming::Other(other),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentifyData<'a> {
    rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    authentication: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestData<'a> {
    request_type: &'a str,
    request_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_data: Option<&'a Value>,
}

/// Identify frame (op 1), with the credential when one was computed
pub fn identify(authentication: Option<&str>) -> String {
    json!({
        "op": op::IDENTIFY,
        "d": IdentifyData { rpc_version: RPC_VERSION, authentication },
    })
    .to_string()
}

/// Request frame (op 6)
pub fn request(request_type: &str, request_id: &str, data: Option<&Value>) -> String {
    json!({
        "op": op::REQUEST,
        "d": RequestData { request_type, request_id, request_data: data },
    })
    .to_string()
}

/// Two-stage credential: `b64(sha256(b64(sha256(password + salt)) + challenge))`
pub fn compute_auth(password: &str, salt: &str, challenge: &str) -> String {
    let secret = STANDARD.encode(Sha256::digest(format!("{}{}", password, salt)));
    STANDARD.encode(Sha256::digest(format!("{}{}", secret, challenge)))
}
