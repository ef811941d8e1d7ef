//! Capsule process supervision and the `Created -> Starting -> Ready ->
//! {Crashed, Stopped}` state machine (spec §4.6).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt as _, AsyncWriteExt as _, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::error::CapsuleError;
use crate::executor::capsule::protocol::{self, Frame, HelloParams, Request, Response};
use crate::tool::ToolDescriptor;

/// Maximum line length the reader will accept before treating the
/// capsule as crashed (spec §4.6 "recommended 1 MiB").
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Grace period between closing stdin and force-killing the child on
/// `Stop` (spec §4.6 "kill the process if still alive after a short
/// grace").
const STOP_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapsuleState {
    Created,
    Starting,
    Ready,
    Crashed,
    Stopped,
}

type PendingSender = oneshot::Sender<Result<Response, CapsuleError>>;

/// A handle to one long-running capsule process backing a single tool.
pub struct CapsuleHandle {
    descriptor: Arc<ToolDescriptor>,
    clock: SharedClock,
    state: Arc<Mutex<CapsuleState>>,
    child: Arc<Mutex<Option<Child>>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    pending: Arc<Mutex<HashMap<i64, PendingSender>>>,
    next_id: AtomicI64,
}

impl CapsuleHandle {
    #[must_use]
    pub fn new(descriptor: Arc<ToolDescriptor>, clock: SharedClock) -> Self {
        Self {
            descriptor,
            clock,
            state: Arc::new(Mutex::new(CapsuleState::Created)),
            child: Arc::new(Mutex::new(None)),
            stdin: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn state(&self) -> CapsuleState {
        *self.state.lock().await
    }

    /// Spawn the child process and wait for its `orla.hello` handshake
    /// (spec §4.6 "Start").
    pub async fn start(&self) -> Result<(), CapsuleError> {
        {
            let mut state = self.state.lock().await;
            if *state != CapsuleState::Created {
                return Err(CapsuleError::BadState {
                    state: state_name(*state),
                });
            }
            *state = CapsuleState::Starting;
        }

        let argv = self.descriptor.build_argv(&self.descriptor.extra_args);
        let (program, rest) = argv
            .split_first()
            .ok_or_else(|| CapsuleError::StartFailure("empty argv".to_string()))?;

        let mut command = tokio::process::Command::new(program);
        command
            .args(rest)
            .envs(&self.descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| CapsuleError::StartFailure(e.to_string()))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        *self.stdin.lock().await = stdin;
        *self.child.lock().await = Some(child);

        tokio::spawn(drain_stderr(stderr, self.descriptor.name.clone()));

        let (hello_tx, hello_rx) = oneshot::channel();
        tokio::spawn(reader_loop(
            stdout,
            Arc::clone(&self.pending),
            Arc::clone(&self.state),
            self.descriptor.name.clone(),
            hello_tx,
        ));

        let timeout = Duration::from_millis(self.descriptor.startup_timeout_ms);
        match self.clock.timeout(timeout, hello_rx).await {
            Ok(Ok(Ok(()))) => {
                let mut state = self.state.lock().await;
                *state = CapsuleState::Ready;
                info!(tool = %self.descriptor.name, "capsule ready");
                Ok(())
            }
            Ok(Ok(Err(_))) | Ok(Err(_)) | Err(()) => {
                let mut state = self.state.lock().await;
                *state = CapsuleState::Crashed;
                self.kill_child().await;
                Err(CapsuleError::HandshakeTimeout {
                    timeout_ms: self.descriptor.startup_timeout_ms,
                })
            }
        }
    }

    /// Invoke the tool hosted by this capsule (spec §4.6 "CallTool").
    /// Racing `cancel` against the timeout lets a caller-context
    /// cancellation remove the pending entry and return before either a
    /// response or the timeout arrives (spec §5/§8/§9).
    pub async fn call_tool(
        &self,
        input: serde_json::Value,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Response, CapsuleError> {
        {
            let state = self.state.lock().await;
            if *state != CapsuleState::Ready {
                return Err(CapsuleError::NotReady);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let request = Request::call_tool(id, &self.descriptor.name, input);
        let write_result = {
            let mut guard = self.stdin.lock().await;
            match guard.as_mut() {
                Some(stdin) => stdin.write_all(request.to_line().as_bytes()).await,
                None => {
                    self.pending.lock().await.remove(&id);
                    return Err(CapsuleError::StdinUnavailable);
                }
            }
        };
        if write_result.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(CapsuleError::StdinUnavailable);
        }

        tokio::select! {
            result = self.clock.timeout(timeout, rx) => {
                match result {
                    Ok(Ok(result)) => result,
                    Ok(Err(_recv_dropped)) => {
                        self.pending.lock().await.remove(&id);
                        Err(CapsuleError::CapsuleContextCancelled)
                    }
                    Err(()) => {
                        self.pending.lock().await.remove(&id);
                        Err(CapsuleError::RequestTimeout { id })
                    }
                }
            }
            () = cancel.cancelled() => {
                self.pending.lock().await.remove(&id);
                Err(CapsuleError::Cancelled { id })
            }
        }
    }

    /// Tear down the capsule. Idempotent and safe from any state (spec
    /// §4.6 "Stop").
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == CapsuleState::Stopped {
                return;
            }
            *state = CapsuleState::Stopped;
        }

        self.stdin.lock().await.take();

        for (_, sender) in self.pending.lock().await.drain() {
            let _ = sender.send(Err(CapsuleError::CapsuleStopped));
        }

        self.clock.sleep(STOP_GRACE).await;
        self.kill_child().await;
    }

    async fn kill_child(&self) {
        if let Some(child) = self.child.lock().await.as_mut() {
            let _ = child.start_kill();
        }
    }
}

fn state_name(state: CapsuleState) -> &'static str {
    match state {
        CapsuleState::Created => "Created",
        CapsuleState::Starting => "Starting",
        CapsuleState::Ready => "Ready",
        CapsuleState::Crashed => "Crashed",
        CapsuleState::Stopped => "Stopped",
    }
}

async fn reader_loop(
    stdout: tokio::process::ChildStdout,
    pending: Arc<Mutex<HashMap<i64, PendingSender>>>,
    state: Arc<Mutex<CapsuleState>>,
    tool_name: String,
    hello_tx: oneshot::Sender<Result<(), ()>>,
) {
    let mut lines = BufReader::with_capacity(MAX_LINE_BYTES, stdout).lines();
    let mut hello_tx = Some(hello_tx);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(tool = %tool_name, "capsule stdout closed");
                break;
            }
            Err(err) => {
                error!(tool = %tool_name, error = %err, "capsule stdout read error");
                break;
            }
        };

        if line.len() > MAX_LINE_BYTES {
            warn!(tool = %tool_name, "capsule emitted an oversize line, crashing capsule");
            break;
        }

        match protocol::decode_line(&line) {
            Ok(Frame::Response(response)) => {
                if let Some(sender) = pending.lock().await.remove(&response.id) {
                    let _ = sender.send(Ok(response));
                }
            }
            Ok(Frame::Notification(notification)) if notification.method == protocol::HELLO_METHOD => {
                if let Some(tx) = hello_tx.take() {
                    let parsed: Option<HelloParams> = notification
                        .params
                        .and_then(|p| serde_json::from_value(p).ok());
                    if parsed.is_some() {
                        let _ = tx.send(Ok(()));
                    } else {
                        let _ = tx.send(Err(()));
                    }
                }
            }
            Ok(Frame::Notification(notification)) => {
                debug!(tool = %tool_name, method = %notification.method, "unhandled capsule notification");
            }
            Err(err) => {
                warn!(tool = %tool_name, error = %err, line = %line, "failed to decode capsule frame");
            }
        }
    }

    if let Some(tx) = hello_tx.take() {
        let _ = tx.send(Err(()));
    }

    let mut guard = state.lock().await;
    if *guard != CapsuleState::Stopped {
        *guard = CapsuleState::Crashed;
        drop(guard);
        for (_, sender) in pending.lock().await.drain() {
            let _ = sender.send(Err(CapsuleError::CapsuleCrashed {
                reason: "capsule stdout closed unexpectedly".to_string(),
            }));
        }
    }
}

async fn drain_stderr(stderr: tokio::process::ChildStderr, tool_name: String) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        warn!(tool = %tool_name, stderr = %line, "capsule stderr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use std::collections::HashMap as Map;
    use std::os::unix::fs::PermissionsExt as _;
    use std::path::PathBuf;

    fn echo_capsule_script() -> &'static str {
        r#"#!/bin/sh
echo '{"jsonrpc":"2.0","method":"orla.hello","params":{"name":"echo","version":"1.0.0"}}'
while IFS= read -r line; do
  id=$(echo "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"ok\":true}}"
done
"#
    }

    fn descriptor(path: PathBuf) -> ToolDescriptor {
        ToolDescriptor {
            name: "echo".into(),
            description: String::new(),
            path,
            interpreter: "/bin/sh".into(),
            input_schema: None,
            output_schema: None,
            runtime_mode: crate::tool::RuntimeMode::Capsule,
            startup_timeout_ms: 2_000,
            env: Map::new(),
            extra_args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn handshake_then_call_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let script_path = dir.path().join("echo.sh");
        std::fs::write(&script_path, echo_capsule_script()).unwrap();
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handle = CapsuleHandle::new(Arc::new(descriptor(script_path)), system_clock());
        handle.start().await.unwrap();
        assert_eq!(handle.state().await, CapsuleState::Ready);

        let response = handle
            .call_tool(serde_json::json!({"x": 1}), Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.error.is_none());

        handle.stop().await;
        assert_eq!(handle.state().await, CapsuleState::Stopped);
    }

    #[tokio::test]
    async fn caller_cancellation_clears_pending_entry() {
        let dir = tempfile::TempDir::new().unwrap();
        let script_path = dir.path().join("echo.sh");
        std::fs::write(&script_path, echo_capsule_script()).unwrap();
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let handle = CapsuleHandle::new(Arc::new(descriptor(script_path)), system_clock());
        handle.start().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = handle
            .call_tool(serde_json::json!({"x": 1}), Duration::from_secs(2), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CapsuleError::Cancelled { .. }));
        assert!(handle.pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn start_fails_fast_on_missing_program() {
        let handle = CapsuleHandle::new(
            Arc::new(ToolDescriptor {
                startup_timeout_ms: 200,
                ..descriptor(PathBuf::from("/nonexistent"))
            }),
            system_clock(),
        );
        let err = handle.start().await.unwrap_err();
        assert!(matches!(
            err,
            CapsuleError::StartFailure(_) | CapsuleError::HandshakeTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn call_before_start_is_not_ready() {
        let handle = CapsuleHandle::new(
            Arc::new(descriptor(PathBuf::from("/bin/true"))),
            system_clock(),
        );
        let err = handle
            .call_tool(serde_json::json!({}), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CapsuleError::NotReady));
    }
}
