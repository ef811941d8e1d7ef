//! Stdio transport (spec §4.7 "ServeStdio"), adapted from the teacher's
//! line-based JSON-RPC loop.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader, BufWriter};
use tracing::error;

use crate::server::protocol::{dispatch, McpRequest, McpResponse};
use crate::server::Orchestrator;

/// Run the stdio transport: read one JSON-RPC request per line from
/// stdin, write one response per line to stdout. All logging goes to
/// stderr so it never corrupts the protocol stream.
pub async fn serve(orchestrator: Arc<Orchestrator>) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::with_capacity(8192, stdin).lines();
    let stdout = tokio::io::stdout();
    let mut stdout = BufWriter::with_capacity(8192, stdout);

    tracing::info!("starting stdio transport");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<McpRequest, _> = serde_json::from_str(&line);
        let response = match request {
            Ok(request) => {
                if request.id.is_none() {
                    if request.method != "notifications/initialized" {
                        tracing::debug!(method = %request.method, "ignoring notification");
                    }
                    continue;
                }
                dispatch(&orchestrator, request).await
            }
            Err(err) => {
                error!(error = %err, line = %line, "failed to parse JSON-RPC request");
                let id = serde_json::from_str::<serde_json::Value>(&line)
                    .ok()
                    .and_then(|value| value.get("id").cloned());
                let mut response = McpResponse::parse_error(format!("Parse error: {err}"));
                response.id = id;
                response
            }
        };

        let Ok(response_json) = serde_json::to_string(&response) else {
            error!("failed to serialize response");
            continue;
        };
        stdout.write_all(response_json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    Ok(())
}
