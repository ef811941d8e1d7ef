//! Execution runtimes (spec §4.5, §4.6, §9): two independent strategies
//! for invoking a tool, unified behind [`ExecOutcome`] so the orchestrator
//! can treat them uniformly.

pub mod capsule;
pub mod simple;

/// The result of invoking a tool, regardless of runtime mode.
///
/// Simple-mode always produces a `stdout`/`stderr`/`exit_code` triple (an
/// `error` is only set for start failures, timeouts, or abnormal exits —
/// spec §4.5 step 7 "if the process exited non-zero ... return (no
/// `error`)"). Capsule-mode never has a meaningful `exit_code` or
/// `stderr` capture per call, since both belong to the long-running
/// process rather than a single request; callers keyed on `runtime_mode`
/// know which fields are meaningful.
#[derive(Debug, Clone, Default)]
pub struct ExecOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}
