//! The JSON command envelope carried in a frame body.
//!
//! ```json
//! {"status": 0, "cmd": "ping", "msg": "", "seqno": "42", "data": {...}}
//! ```
//!
//! Requests fill `cmd`, `seqno` and `data`; responses fill `status`, `cmd`,
//! `msg` and `seqno`. Every field is optional on the wire.

use serde::{Deserialize, Serialize};

/// Status of a successful response.
pub const STATUS_OK: i32 = 0;

/// Status of every error response the framework emits.
pub const STATUS_ERROR: i32 = -1;

/// Command echoed back when no handler is registered for a request.
pub const UNKNOWN_ACTION: &str = "unknown-action";

/// A parsed command envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub status: i32,
    pub cmd: String,
    pub msg: String,
    pub seqno: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Envelope {
    /// A request envelope for `cmd`.
    pub fn request(cmd: impl Into<String>, seqno: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            seqno: seqno.into(),
            ..Self::default()
        }
    }

    /// A successful response envelope.
    pub fn ok(cmd: impl Into<String>, seqno: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            ..Self::request(cmd, seqno)
        }
    }

    /// An error response envelope with status `-1`.
    pub fn error(
        cmd: impl Into<String>,
        seqno: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            status: STATUS_ERROR,
            msg: msg.into(),
            ..Self::request(cmd, seqno)
        }
    }

    /// Attaches a `data` payload.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_error(&self) -> bool {
        self.status == STATUS_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_parses_with_missing_fields() {
        let body = r#"{"cmd": "request_mid", "seqno": "", "data": null}"#;
        let env: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.cmd, "request_mid");
        assert_eq!(env.status, 0);
        assert!(env.msg.is_empty());
        assert!(env.data.is_none());
    }

    #[test]
    fn test_request_body_keeps_structured_data() {
        let body = r#"{
            "cmd": "request_heartbeat",
            "seqno": "7",
            "data": {"mid": "123", "mac_status": 1}
        }"#;
        let env: Envelope = serde_json::from_str(body).unwrap();
        assert_eq!(env.data, Some(json!({"mid": "123", "mac_status": 1})));
    }

    #[test]
    fn test_error_envelope_shape() {
        let env = Envelope::error("report_tag", "111", "boom");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({"status": -1, "cmd": "report_tag", "msg": "boom", "seqno": "111"})
        );
        assert!(env.is_error());
    }

    #[test]
    fn test_error_message_with_quotes_stays_valid_json() {
        let env = Envelope::error("x", "1", r#"bad "quote" \ here"#);
        let bytes = serde_json::to_vec(&env).unwrap();
        let back: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_ok_with_data_serializes_data() {
        let env = Envelope::ok("pong", "9").with_data(json!([1, 2]));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["data"], json!([1, 2]));
        assert_eq!(value["status"], json!(0));
    }

    #[test]
    fn test_decode_garbage_returns_error() {
        let result: Result<Envelope, _> = serde_json::from_slice(b"not json");
        assert!(result.is_err());
    }
}
