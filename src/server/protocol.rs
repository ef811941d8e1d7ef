//! MCP JSON-RPC 2.0 envelope and method dispatch, shared by the HTTP and
//! stdio transports (spec §4.7, GLOSSARY "RPC surface").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::server::Orchestrator;

pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const PARSE_ERROR: i32 = -32700;

#[derive(Debug, Deserialize)]
pub struct McpRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

#[derive(Debug, Serialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(McpError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::err(None, PARSE_ERROR, message)
    }
}

/// Route one decoded request to the appropriate handler (spec §4.7
/// "Registration": `initialize`, `tools/list`, `tools/call`).
pub async fn dispatch(orchestrator: &Orchestrator, request: McpRequest) -> McpResponse {
    match request.method.as_str() {
        "initialize" => handle_initialize(orchestrator, request.id),
        "tools/list" => handle_tools_list(orchestrator, request.id).await,
        "tools/call" => handle_tools_call(orchestrator, request.id, request.params).await,
        other => McpResponse::err(request.id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    }
}

fn handle_initialize(orchestrator: &Orchestrator, id: Option<Value>) -> McpResponse {
    McpResponse::ok(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": orchestrator.info.name,
                "version": orchestrator.info.version,
            }
        }),
    )
}

async fn handle_tools_list(orchestrator: &Orchestrator, id: Option<Value>) -> McpResponse {
    let tools: Vec<Value> = orchestrator
        .list_tools()
        .await
        .iter()
        .map(|tool| {
            serde_json::json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": tool.input_schema.clone().unwrap_or_else(|| serde_json::json!({"type": "object"})),
            })
        })
        .collect();

    McpResponse::ok(id, serde_json::json!({ "tools": tools }))
}

async fn handle_tools_call(orchestrator: &Orchestrator, id: Option<Value>, params: Option<Value>) -> McpResponse {
    let Some(params) = params else {
        return McpResponse::err(id, INVALID_PARAMS, "Invalid params");
    };

    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

    let surface = orchestrator.surface().await;
    let Some(handler) = surface.get(tool_name) else {
        return McpResponse::err(id, METHOD_NOT_FOUND, format!("Unknown tool: {tool_name}"));
    };

    // Neither transport currently surfaces a connection-level cancel
    // signal, so each call gets its own fresh token; plumbing through
    // a real disconnect signal from `http`/`stdio` is the natural next
    // step once one exists.
    let outcome = handler(arguments, CancellationToken::new()).await;
    McpResponse::ok(id, outcome.to_result_json())
}
