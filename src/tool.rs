//! Tool data model (spec §3).

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default per-call timeout, in milliseconds, for simple-mode execution
/// when the server config doesn't override it (spec §4.5).
pub const DEFAULT_SIMPLE_TIMEOUT_MS: u64 = 30_000;

/// Default handshake timeout for capsule-mode tools (spec §3).
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 5_000;

/// The runtime strategy used to execute a tool (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    /// Spawn a fresh process per call.
    Simple,
    /// Forward calls to a long-running process over line-delimited
    /// JSON-RPC on stdio.
    Capsule,
}

impl Default for RuntimeMode {
    fn default() -> Self {
        RuntimeMode::Simple
    }
}

/// The authoritative, immutable-after-insertion record of one invokable
/// tool (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique within the registry; used as the RPC method key.
    pub name: String,
    /// May be empty.
    #[serde(default)]
    pub description: String,
    /// Absolute path of the executable or script.
    pub path: PathBuf,
    /// Absolute path of the interpreter; empty means "spawn `path`
    /// directly".
    #[serde(default)]
    pub interpreter: String,
    /// Optional JSON-Schema fragment describing the argument object.
    #[serde(default)]
    pub input_schema: Option<serde_json::Value>,
    /// Optional JSON-Schema the tool's stdout must conform to.
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    /// Execution strategy.
    #[serde(default)]
    pub runtime_mode: RuntimeMode,
    /// Capsule-only: how long to wait for the `orla.hello` handshake.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
    /// Capsule-only: environment overlay added to the inherited
    /// environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Capsule-only: extra arguments appended to argv.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_startup_timeout_ms() -> u64 {
    DEFAULT_STARTUP_TIMEOUT_MS
}

impl ToolDescriptor {
    /// Build argv for spawning this tool: `[interpreter, path, ...args]`
    /// if an interpreter is set, else `[path, ...args]` (spec §4.5 step
    /// 2).
    #[must_use]
    pub fn build_argv(&self, args: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(2 + args.len());
        if !self.interpreter.is_empty() {
            argv.push(self.interpreter.clone());
        }
        argv.push(self.path.display().to_string());
        argv.extend_from_slice(args);
        argv
    }

    /// The program to hand to `Command::new`: the interpreter if set,
    /// otherwise the tool's own path.
    #[must_use]
    pub fn program(&self) -> &str {
        if self.interpreter.is_empty() {
            self.path.to_str().unwrap_or_default()
        } else {
            &self.interpreter
        }
    }

    /// The arguments that follow the program in argv, given extra
    /// call-level args.
    #[must_use]
    pub fn program_args(&self, args: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(1 + args.len());
        if !self.interpreter.is_empty() {
            argv.push(self.path.display().to_string());
        }
        argv.extend_from_slice(args);
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(interpreter: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: "t".into(),
            description: String::new(),
            path: PathBuf::from("/tools/t.sh"),
            interpreter: interpreter.to_string(),
            input_schema: None,
            output_schema: None,
            runtime_mode: RuntimeMode::Simple,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            env: HashMap::new(),
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn argv_with_interpreter() {
        let d = descriptor("/bin/sh");
        assert_eq!(d.program(), "/bin/sh");
        assert_eq!(d.program_args(&["a".into()]), vec!["/tools/t.sh", "a"]);
        assert_eq!(
            d.build_argv(&["a".into()]),
            vec!["/bin/sh", "/tools/t.sh", "a"]
        );
    }

    #[test]
    fn argv_without_interpreter() {
        let d = descriptor("");
        assert_eq!(d.program(), "/tools/t.sh");
        assert_eq!(d.program_args(&["a".into()]), vec!["a"]);
        assert_eq!(d.build_argv(&["a".into()]), vec!["/tools/t.sh", "a"]);
    }
}
