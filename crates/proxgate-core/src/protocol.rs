use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Maximum accepted request line (1 MiB).
pub const MAX_LINE_SIZE: usize = 1024 * 1024;

// ============================================================================
// Request/Response types
// ============================================================================

/// One tool invocation, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Caller-chosen correlation id, echoed back verbatim.
    #[serde(default)]
    pub id: serde_json::Value,
    pub tool: String,
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Structured error body of a failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl From<&GatewayError> for ToolError {
    fn from(e: &GatewayError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Result of a tool call. Never a transport-level fault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub id: serde_json::Value,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: serde_json::Value, code: &str, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ToolError {
                code: code.to_string(),
                message: message.into(),
            }),
        }
    }

    pub fn from_error<'a, E>(id: serde_json::Value, err: &'a E) -> Self
    where
        ToolError: From<&'a E>,
    {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ToolError::from(err)),
        }
    }
}

// ============================================================================
// Line framing
// ============================================================================

/// Response for a request line longer than [`MAX_LINE_SIZE`].
pub fn oversized_request() -> ToolResponse {
    ToolResponse::failure(
        serde_json::Value::Null,
        "bad_request",
        format!("request too large (max {} bytes)", MAX_LINE_SIZE),
    )
}

/// Decode one raw request line. Invalid UTF-8 is a malformed request like
/// any other.
pub fn decode_request(line: &[u8]) -> Result<ToolRequest, ToolResponse> {
    if line.len() > MAX_LINE_SIZE {
        return Err(oversized_request());
    }
    serde_json::from_slice(line).map_err(|e| {
        ToolResponse::failure(
            serde_json::Value::Null,
            "bad_request",
            format!("malformed request: {}", e),
        )
    })
}

/// Encode one response as a single line (no trailing newline).
pub fn encode_response(resp: &ToolResponse) -> String {
    serde_json::to_string(resp).unwrap_or_else(|e| {
        format!(
            r#"{{"id":null,"ok":false,"error":{{"code":"internal","message":"failed to encode response: {}"}}}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_defaults_arguments() {
        let req = decode_request(br#"{"id": 7, "tool": "get_nodes"}"#).unwrap();
        assert_eq!(req.id, json!(7));
        assert_eq!(req.tool, "get_nodes");
        assert_eq!(req.arguments, json!({}));
    }

    #[test]
    fn test_decode_request_rejects_garbage() {
        let resp = decode_request(b"{not json").unwrap_err();
        assert!(!resp.ok);
        assert_eq!(resp.error.unwrap().code, "bad_request");
    }

    #[test]
    fn test_decode_request_rejects_invalid_utf8_and_oversize() {
        let resp = decode_request(b"\xff\xfe garbage").unwrap_err();
        assert_eq!(resp.error.unwrap().code, "bad_request");

        let resp = decode_request(b"{\"id\": 1, \"tool\": \"get_\xffnodes\"}").unwrap_err();
        assert_eq!(resp.error.unwrap().code, "bad_request");

        let big = vec![b' '; MAX_LINE_SIZE + 1];
        let resp = decode_request(&big).unwrap_err();
        assert!(resp.error.unwrap().message.contains("too large"));
    }

    #[test]
    fn test_error_response_shape() {
        let err = GatewayError::SafetyGateRejected {
            action: "rollback_snapshot".to_string(),
        };
        let resp = ToolResponse::from_error(json!("abc"), &err);
        let line = encode_response(&resp);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"]["code"], "safety_gate_rejected");
        assert!(value.get("result").is_none());
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_success_response_shape() {
        let resp = ToolResponse::success(json!(1), json!({"upid": "UPID:pve1:..."}));
        let value: serde_json::Value = serde_json::from_str(&encode_response(&resp)).unwrap();
        assert_eq!(value["ok"], true);
        assert!(value.get("error").is_none());
    }
}
