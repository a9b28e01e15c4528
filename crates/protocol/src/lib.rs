//! Gateway WebSocket/RPC protocol definitions.
//!
//! Protocol version 3. All communication uses JSON text frames over a single
//! WebSocket connection.
//!
//! Frame types:
//! - `RequestFrame`  — client → gateway RPC call
//! - `ResponseFrame` — gateway → client RPC result, correlated by request id
//! - `EventFrame`    — gateway → client server-push

use serde::{Deserialize, Serialize};

// ── Constants ────────────────────────────────────────────────────────────────

pub const PROTOCOL_VERSION: u32 = 3;

/// Method name of the handshake request.
pub const METHOD_CONNECT: &str = "connect";

/// The server's mandatory first frame: an event with this name.
pub const EVENT_CHALLENGE: &str = "connect.challenge";

// ── Roles, scopes, capabilities ──────────────────────────────────────────────

pub mod roles {
    pub const OPERATOR: &str = "operator";
}

pub mod scopes {
    pub const ADMIN: &str = "operator.admin";
}

pub mod caps {
    pub const TOOL_EVENTS: &str = "tool-events";
}

// ── Error codes ──────────────────────────────────────────────────────────────

pub mod error_codes {
    /// Server violated the handshake sequence.
    pub const PROTOCOL: &str = "PROTOCOL";
    /// Server rejected the connect request without its own code.
    pub const CONNECT_FAILED: &str = "CONNECT_FAILED";
    /// RPC attempted before `connect()` or after `close()`.
    pub const NOT_CONNECTED: &str = "NOT_CONNECTED";
    /// A call exceeded its deadline.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Server marked a response failed without its own code.
    pub const RPC_ERROR: &str = "RPC_ERROR";
}

// ── Error shape ──────────────────────────────────────────────────────────────

/// Wire error object. `code` and `message` default to empty strings when the
/// server omits them; the client substitutes its own defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorShape {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

// ── Frames ───────────────────────────────────────────────────────────────────

/// Client → gateway RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    pub r#type: String, // always "req"
    pub id: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RequestFrame {
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        params: Option<serde_json::Value>,
    ) -> Self {
        Self {
            r#type: "req".into(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Gateway → client RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub r#type: String, // always "res"
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ResponseFrame {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: ErrorShape) -> Self {
        Self {
            r#type: "res".into(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error),
        }
    }
}

/// Gateway → client server-push event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub r#type: String, // always "event"
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            r#type: "event".into(),
            event: event.into(),
            payload: Some(payload),
        }
    }

    /// Event payload, or `Null` when the frame carried none.
    pub fn payload_or_null(&self) -> serde_json::Value {
        self.payload.clone().unwrap_or(serde_json::Value::Null)
    }
}

/// Discriminated union of all inbound frame kinds.
///
/// Unrecognized `type` values parse to `Unknown` rather than failing, so a
/// future protocol revision cannot take down an established connection.
#[derive(Debug, Clone)]
pub enum GatewayFrame {
    Request(RequestFrame),
    Response(ResponseFrame),
    Event(EventFrame),
    Unknown { kind: String },
}

impl GatewayFrame {
    /// Parse one wire frame from JSON text.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value.get("type").and_then(serde_json::Value::as_str);
        match kind {
            Some("req") => Ok(Self::Request(serde_json::from_value(value)?)),
            Some("res") => Ok(Self::Response(serde_json::from_value(value)?)),
            Some("event") => Ok(Self::Event(serde_json::from_value(value)?)),
            other => Ok(Self::Unknown {
                kind: other.unwrap_or_default().to_string(),
            }),
        }
    }
}

// ── Connect handshake ────────────────────────────────────────────────────────

/// Parameters of the initial `connect` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "minProtocol")]
    pub min_protocol: u32,
    #[serde(rename = "maxProtocol")]
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub auth: ConnectAuth,
    pub role: String,
    pub scopes: Vec<String>,
    pub caps: Vec<String>,
}

impl ConnectParams {
    /// Standard operator handshake: v3 only, admin scope, tool-event delivery.
    pub fn operator(client: ClientInfo, gateway_token: impl Into<String>) -> Self {
        Self {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client,
            auth: ConnectAuth {
                token: gateway_token.into(),
            },
            role: roles::OPERATOR.into(),
            scopes: vec![scopes::ADMIN.into()],
            caps: vec![caps::TOOL_EVENTS.into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectAuth {
    pub token: String,
}

/// Payload of a successful connect response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelloPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u32>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ── Connect params ─────────────────────────────────────────────────

    #[test]
    fn operator_connect_params_wire_keys() {
        let client = ClientInfo {
            id: "gateway-client".into(),
            version: "hypercli-sdk".into(),
            platform: "linux".into(),
            mode: "backend".into(),
        };
        let params = ConnectParams::operator(client, "tok");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["minProtocol"], 3);
        assert_eq!(json["maxProtocol"], 3);
        assert_eq!(json["client"]["id"], "gateway-client");
        assert_eq!(json["auth"]["token"], "tok");
        assert_eq!(json["role"], "operator");
        assert_eq!(json["scopes"], serde_json::json!(["operator.admin"]));
        assert_eq!(json["caps"], serde_json::json!(["tool-events"]));
    }

    #[test]
    fn connect_params_round_trip() {
        let json = serde_json::json!({
            "minProtocol": 3,
            "maxProtocol": 3,
            "client": { "id": "c", "version": "v", "platform": "p", "mode": "backend" },
            "auth": { "token": "t" },
            "role": "operator",
            "scopes": ["operator.admin"],
            "caps": ["tool-events"],
        });
        let params: ConnectParams = serde_json::from_value(json).unwrap();
        assert_eq!(params.min_protocol, 3);
        assert_eq!(params.client.mode, "backend");
    }

    // ── Frames ─────────────────────────────────────────────────────────

    #[test]
    fn request_frame_omits_null_params() {
        let frame = RequestFrame::new("1", "status", None);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "req");
        assert!(!json.as_object().unwrap().contains_key("params"));
    }

    #[test]
    fn request_frame_includes_params() {
        let frame = RequestFrame::new("1", "agents.get", Some(serde_json::json!({"agentId": "main"})));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["params"]["agentId"], "main");
    }

    #[test]
    fn parse_response_frame() {
        let text = r#"{"type":"res","id":"7","ok":true,"payload":{"models":[]}}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Response(res) => {
                assert!(res.ok);
                assert_eq!(res.id, "7");
                assert!(res.error.is_none());
            },
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parse_error_response_frame() {
        let text = r#"{"type":"res","id":"7","ok":false,"error":{"code":"NOT_FOUND","message":"no such agent"}}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Response(res) => {
                assert!(!res.ok);
                assert_eq!(res.error.unwrap().code, "NOT_FOUND");
            },
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn parse_event_frame() {
        let text = r#"{"type":"event","event":"chat.content","payload":{"text":"hi"}}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Event(ev) => {
                assert_eq!(ev.event, "chat.content");
                assert_eq!(ev.payload_or_null()["text"], "hi");
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn parse_event_frame_without_payload() {
        let text = r#"{"type":"event","event":"connect.challenge"}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Event(ev) => {
                assert_eq!(ev.event, EVENT_CHALLENGE);
                assert!(ev.payload_or_null().is_null());
            },
            other => panic!("expected Event, got {other:?}"),
        }
    }

    #[test]
    fn unknown_frame_kind_parses_to_unknown() {
        let text = r#"{"type":"ping","id":"1"}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Unknown { kind } => assert_eq!(kind, "ping"),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn missing_frame_kind_parses_to_unknown() {
        let text = r#"{"event":"chat.content"}"#;
        match GatewayFrame::parse(text).unwrap() {
            GatewayFrame::Unknown { kind } => assert!(kind.is_empty()),
            other => panic!("expected Unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        assert!(GatewayFrame::parse("not json").is_err());
    }

    // ── Error shape / hello payload ────────────────────────────────────

    #[test]
    fn error_shape_omits_empty_details() {
        let err = ErrorShape::new("TIMEOUT", "too slow");
        let json = serde_json::to_value(&err).unwrap();
        assert!(!json.as_object().unwrap().contains_key("details"));
    }

    #[test]
    fn hello_payload_tolerates_missing_fields() {
        let hello: HelloPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(hello.version.is_none());
        assert!(hello.protocol.is_none());

        let hello: HelloPayload =
            serde_json::from_value(serde_json::json!({"version": "2026.1.0", "protocol": 3}))
                .unwrap();
        assert_eq!(hello.version.as_deref(), Some("2026.1.0"));
        assert_eq!(hello.protocol, Some(3));
    }

    #[test]
    fn response_helpers_set_ok_flag() {
        let ok = ResponseFrame::ok("1", serde_json::json!({}));
        assert!(ok.ok && ok.error.is_none());

        let err = ResponseFrame::err("2", ErrorShape::new("INTERNAL", "boom"));
        assert!(!err.ok && err.payload.is_none());
    }
}
