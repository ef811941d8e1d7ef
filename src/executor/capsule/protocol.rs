//! JSON-RPC 2.0 envelope types exchanged with a capsule over stdio
//! (spec §4.6).

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name used in the capsule's startup notification.
pub const HELLO_METHOD: &str = "orla.hello";

/// Method name used for every tool invocation sent to a capsule.
pub const CALL_TOOL_METHOD: &str = "tools/call";

#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: &'static str,
    pub params: Value,
}

impl Request {
    #[must_use]
    pub fn call_tool(id: i64, tool_name: &str, arguments: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: CALL_TOOL_METHOD,
            params: serde_json::json!({ "name": tool_name, "arguments": arguments }),
        }
    }

    /// Serialize as a single newline-terminated JSON line (spec §4.6
    /// "Stdin/stdout discipline").
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_default();
        line.push('\n');
        line
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// `orla.hello` notification payload (spec §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HelloParams {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// A line decoded off the capsule's stdout: either a response to one of
/// our requests, or an unsolicited notification.
#[derive(Debug, Clone)]
pub enum Frame {
    Response(Response),
    Notification(Notification),
}

/// Decode one line of capsule stdout. Distinguishes a response from a
/// notification by presence of `id` vs `method` (spec §4.6 "Reader").
pub fn decode_line(line: &str) -> Result<Frame, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    if value.get("method").is_some() {
        Ok(Frame::Notification(serde_json::from_value(value)?))
    } else {
        Ok(Frame::Response(serde_json::from_value(value)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_tool_request_serializes_with_newline() {
        let req = Request::call_tool(7, "greet", serde_json::json!({"name": "ada"}));
        let line = req.to_line();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"tools/call\""));
        assert!(line.contains("\"id\":7"));
    }

    #[test]
    fn decodes_response_frame() {
        let line = r#"{"jsonrpc":"2.0","id":3,"result":{"ok":true}}"#;
        match decode_line(line).unwrap() {
            Frame::Response(resp) => {
                assert_eq!(resp.id, 3);
                assert!(resp.error.is_none());
            }
            Frame::Notification(_) => panic!("expected response"),
        }
    }

    #[test]
    fn decodes_hello_notification() {
        let line = r#"{"jsonrpc":"2.0","method":"orla.hello","params":{"name":"greet","version":"1.0.0"}}"#;
        match decode_line(line).unwrap() {
            Frame::Notification(n) => {
                assert_eq!(n.method, HELLO_METHOD);
                let hello: HelloParams = serde_json::from_value(n.params.unwrap()).unwrap();
                assert_eq!(hello.name, "greet");
            }
            Frame::Response(_) => panic!("expected notification"),
        }
    }
}
