//! Simple (spawn-per-call) executor (spec §4.5).

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::SimpleExecError;
use crate::executor::ExecOutcome;
use crate::tool::ToolDescriptor;

/// Cap on how much of stdout/stderr we buffer per call, so a runaway tool
/// can't exhaust memory (spec §4.5 step 5, "bounded-growth buffers").
const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

/// Run `descriptor` once with `args` and `stdin`, enforcing `timeout`
/// and racing the run against `cancel` so a caller-context cancellation
/// (distinct from hitting the timeout) kills the process and returns
/// before the timeout would otherwise fire (spec §4.5, §9).
pub async fn execute(
    clock: &dyn Clock,
    descriptor: &ToolDescriptor,
    args: &[String],
    stdin: &[u8],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ExecOutcome, SimpleExecError> {
    let program_args = descriptor.program_args(args);

    let mut command = Command::new(descriptor.program());
    command
        .args(&program_args)
        .envs(&descriptor.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| SimpleExecError::StartFailure {
        path: descriptor.path.clone(),
        source,
    })?;

    let mut stdin_pipe = child.stdin.take();
    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");

    if !stdin.is_empty() {
        if let Some(pipe) = stdin_pipe.as_mut() {
            let _ = pipe.write_all(stdin).await;
        }
    }
    drop(stdin_pipe);

    let run = async {
        let stdout_fut = drain(&mut stdout_pipe);
        let stderr_fut = drain(&mut stderr_pipe);
        let (stdout, stderr) = tokio::join!(stdout_fut, stderr_fut);
        let status = child.wait().await;
        (stdout, stderr, status)
    };

    tokio::select! {
        result = clock.timeout(timeout, run) => {
            match result {
                Ok((stdout, stderr, status)) => {
                    let status = status.map_err(|source| SimpleExecError::PipeFailure {
                        path: descriptor.path.clone(),
                        source,
                    })?;

                    match status.code() {
                        Some(code) => Ok(ExecOutcome {
                            stdout,
                            stderr,
                            exit_code: code,
                        }),
                        None => Err(SimpleExecError::AbnormalExit {
                            path: descriptor.path.clone(),
                            message: "process terminated by signal".to_string(),
                        }),
                    }
                }
                Err(()) => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    Err(SimpleExecError::Timeout {
                        path: descriptor.path.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    })
                }
            }
        }
        () = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(SimpleExecError::Cancelled {
                path: descriptor.path.clone(),
            })
        }
    }
}

async fn drain<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if buf.len() + n > MAX_CAPTURE_BYTES {
                    let remaining = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..remaining.min(n)]);
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::system_clock;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn descriptor(path: &str, interpreter: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "t".into(),
            description: String::new(),
            path: PathBuf::from(path),
            interpreter: interpreter.to_string(),
            input_schema: None,
            output_schema: None,
            runtime_mode: crate::tool::RuntimeMode::Simple,
            startup_timeout_ms: crate::tool::DEFAULT_STARTUP_TIMEOUT_MS,
            env: HashMap::new(),
            extra_args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn runs_echo_successfully() {
        let clock = system_clock();
        let d = descriptor("-c", "/bin/sh");
        let outcome = execute(
            &*clock,
            &d,
            &["echo hello".to_string()],
            b"",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(String::from_utf8_lossy(&outcome.stdout).trim(), "hello");
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_an_error() {
        let clock = system_clock();
        let d = descriptor("-c", "/bin/sh");
        let outcome = execute(
            &*clock,
            &d,
            &["exit 3".to_string()],
            b"",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.exit_code, 3);
    }

    #[tokio::test]
    async fn start_failure_on_missing_program() {
        let clock = system_clock();
        let d = descriptor("/nonexistent/tool", "");
        let err = execute(&*clock, &d, &[], b"", Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SimpleExecError::StartFailure { .. }));
    }

    #[tokio::test]
    async fn times_out_long_running_process() {
        let clock = system_clock();
        let d = descriptor("-c", "/bin/sh");
        let err = execute(
            &*clock,
            &d,
            &["sleep 5".to_string()],
            b"",
            Duration::from_millis(50),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SimpleExecError::Timeout { .. }));
    }

    #[tokio::test]
    async fn caller_cancellation_kills_process_before_timeout() {
        let clock = system_clock();
        let d = descriptor("-c", "/bin/sh");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = execute(
            &*clock,
            &d,
            &["sleep 5".to_string()],
            b"",
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SimpleExecError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn stdin_is_forwarded() {
        let clock = system_clock();
        let d = descriptor("-c", "/bin/sh");
        let outcome = execute(
            &*clock,
            &d,
            &["cat".to_string()],
            b"from stdin",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.stdout, b"from stdin");
    }
}
