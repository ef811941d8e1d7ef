//! Per-tool handler construction: argv conversion, result shaping, and
//! panic isolation (spec §4.7).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt as _;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::clock::SharedClock;
use crate::error::{CapsuleError, SimpleExecError};
use crate::executor::capsule::CapsuleHandle;
use crate::executor::simple;
use crate::executor::ExecOutcome;
use crate::tool::ToolDescriptor;

/// A single piece of MCP tool-call content (spec §4.7 "Result shaping").
#[derive(Debug, Clone)]
pub enum ContentItem {
    Text(String),
}

impl ContentItem {
    fn to_json(&self) -> Value {
        match self {
            ContentItem::Text(text) => serde_json::json!({ "type": "text", "text": text }),
        }
    }
}

/// The shaped outcome of one tool invocation, ready for a transport to
/// serialize into its response envelope.
#[derive(Debug, Clone, Default)]
pub struct CallOutcome {
    pub is_error: bool,
    pub content: Vec<ContentItem>,
    /// Populated when the descriptor has an `output_schema` and the
    /// tool's stdout parsed as a JSON object (spec §4.7).
    pub structured: Option<Value>,
    /// Populated in the no-schema path: the raw `{stdout, stderr,
    /// exit_code}` mapping (spec §4.7).
    pub raw: Option<Value>,
}

impl CallOutcome {
    fn error_text(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ContentItem::Text(message.into())],
            structured: None,
            raw: None,
        }
    }

    /// Render as the `result` object of an MCP `tools/call` response.
    #[must_use]
    pub fn to_result_json(&self) -> Value {
        let mut result = serde_json::json!({
            "content": self.content.iter().map(ContentItem::to_json).collect::<Vec<_>>(),
            "isError": self.is_error,
        });
        if let Some(structured) = &self.structured {
            result["structuredContent"] = structured.clone();
        }
        if let Some(raw) = &self.raw {
            result["raw"] = raw.clone();
        }
        result
    }
}

/// The execution strategy a handler closure is bound to at registration
/// time (spec §4.7 "the closure capturing ... the orchestrator's
/// execution strategy").
#[derive(Clone)]
pub enum ExecutionStrategy {
    Simple { clock: SharedClock, timeout: Duration },
    Capsule { handle: Arc<CapsuleHandle>, timeout: Duration },
    /// The tool is registered (it's in the registry and `tools/list`
    /// advertises it) but its capsule failed to start. Calls report a
    /// structured `is_error=true` result instead of a transport-level
    /// error (spec §4.7).
    Unavailable { reason: String },
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A registered tool handler: given call arguments and a per-call
/// cancellation token, produce a shaped outcome. Never returns a
/// transport-level error (spec §7 "the transport call itself never
/// fails").
pub type ToolHandler = Box<dyn Fn(Value, CancellationToken) -> BoxFuture<'static, CallOutcome> + Send + Sync>;

/// Build the handler closure for one tool (spec §4.7 "Registration").
#[must_use]
pub fn build_handler(descriptor: Arc<ToolDescriptor>, strategy: ExecutionStrategy) -> ToolHandler {
    Box::new(move |arguments: Value, cancel: CancellationToken| {
        let descriptor = Arc::clone(&descriptor);
        let strategy = strategy.clone();
        Box::pin(async move {
            let tool_name = descriptor.name.clone();
            match AssertUnwindSafe(invoke(descriptor, strategy, arguments, cancel))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(&panic);
                    error!(tool = %tool_name, panic = %message, "tool handler panicked");
                    CallOutcome::error_text(format!("tool handler panicked: {message}"))
                }
            }
        })
    })
}

async fn invoke(
    descriptor: Arc<ToolDescriptor>,
    strategy: ExecutionStrategy,
    arguments: Value,
    cancel: CancellationToken,
) -> CallOutcome {
    match strategy {
        ExecutionStrategy::Simple { clock, timeout } => {
            let (argv, stdin) = arguments_to_argv(&arguments);
            let result = simple::execute(&*clock, &descriptor, &argv, &stdin, timeout, &cancel).await;
            shape_simple_result(&descriptor, result)
        }
        ExecutionStrategy::Capsule { handle, timeout } => {
            let result = handle.call_tool(arguments, timeout, &cancel).await;
            shape_capsule_result(result)
        }
        ExecutionStrategy::Unavailable { reason } => CallOutcome::error_text(format!("capsule unavailable: {reason}")),
    }
}

fn shape_simple_result(descriptor: &ToolDescriptor, result: Result<ExecOutcome, SimpleExecError>) -> CallOutcome {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return CallOutcome::error_text(err.to_string()),
    };

    if descriptor.output_schema.is_some() {
        return match serde_json::from_slice::<Value>(&outcome.stdout) {
            Ok(Value::Object(map)) => CallOutcome {
                is_error: outcome.exit_code != 0,
                content: Vec::new(),
                structured: Some(Value::Object(map)),
                raw: None,
            },
            Ok(_) => CallOutcome::error_text("tool output not a JSON object"),
            Err(_) => CallOutcome::error_text("tool output not valid JSON"),
        };
    }

    let stdout_text = String::from_utf8_lossy(&outcome.stdout).into_owned();
    let stderr_text = String::from_utf8_lossy(&outcome.stderr).into_owned();

    let mut content = vec![ContentItem::Text(stdout_text.clone())];
    if !stderr_text.is_empty() {
        content.push(ContentItem::Text(format!("stderr: {stderr_text}")));
    }
    content.push(ContentItem::Text(format!("exit_code: {}", outcome.exit_code)));

    CallOutcome {
        is_error: outcome.exit_code != 0,
        content,
        structured: None,
        raw: Some(serde_json::json!({
            "stdout": stdout_text,
            "stderr": stderr_text,
            "exit_code": outcome.exit_code,
        })),
    }
}

fn shape_capsule_result(result: Result<crate::executor::capsule::protocol::Response, CapsuleError>) -> CallOutcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return CallOutcome::error_text(err.to_string()),
    };

    if let Some(error) = response.error {
        return CallOutcome::error_text(format!("{}: {}", error.code, error.message));
    }

    CallOutcome {
        is_error: false,
        content: Vec::new(),
        structured: Some(response.result.unwrap_or(Value::Null)),
        raw: None,
    }
}

/// Convert call arguments into simple-mode argv plus an optional stdin
/// payload (spec §4.7 "Argv conversion").
///
/// `serde_json::Value::Object` is backed by a `BTreeMap` unless the
/// `preserve_order` feature is enabled (it isn't here), so iterating a
/// JSON object already yields keys in sorted order — exactly the
/// deterministic ordering spec §8 asks implementers to pick and
/// document.
fn arguments_to_argv(arguments: &Value) -> (Vec<String>, Vec<u8>) {
    let mut argv = Vec::new();
    let mut stdin = Vec::new();

    let Value::Object(map) = arguments else {
        return (argv, stdin);
    };

    for (key, value) in map {
        if key == "stdin" {
            if let Some(s) = value.as_str() {
                stdin = s.as_bytes().to_vec();
            }
            continue;
        }
        argv.push(format!("--{}", key.replace('_', "-")));
        argv.push(stringify_value(value));
    }

    (argv, stdin)
}

fn stringify_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
