//! Error taxonomy for the tool-runtime subsystem.
//!
//! Each component gets its own error enum (spec §7); [`OrlaError`] is the
//! umbrella type the orchestrator and CLI convert everything into.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while parsing a shebang line (`src/shebang.rs`).
#[derive(Debug, Error)]
pub enum ShebangError {
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: first line {line:?} does not start with '#!'")]
    InvalidPrefix { path: PathBuf, line: String },
    #[error("{path}: shebang line {line:?} has no interpreter field")]
    IncorrectFieldCount {
        path: PathBuf,
        line: String,
        count: usize,
    },
}

/// Errors raised while discovering tools (`src/discovery`).
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("duplicate tool name {name:?} found at {existing} and {duplicate}")]
    DuplicateToolName {
        name: String,
        existing: PathBuf,
        duplicate: PathBuf,
    },
    #[error("tools path {0} exists but is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while validating a `tool.yaml` manifest.
///
/// Manifest errors are always skip-and-warn at the call site (spec §4.3,
/// §7); they never abort discovery.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest {path} is missing required field {field}")]
    MissingField { path: PathBuf, field: &'static str },
    #[error("manifest {path} entrypoint {entrypoint} does not exist")]
    MissingEntrypoint { path: PathBuf, entrypoint: PathBuf },
    #[error("manifest {path} entrypoint {entrypoint} is not executable")]
    EntrypointNotExecutable { path: PathBuf, entrypoint: PathBuf },
    #[error("manifest {path} entrypoint {entrypoint} escapes the install root")]
    EntrypointEscapesRoot { path: PathBuf, entrypoint: PathBuf },
    #[error("manifest {path} has invalid semver {version:?}: {source}")]
    InvalidSemver {
        path: PathBuf,
        version: String,
        #[source]
        source: semver::Error,
    },
}

/// Errors raised by [`crate::registry::ToolsRegistry`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum RegistryError {
    #[error("a tool named {name:?} is already registered")]
    DuplicateToolName { name: String },
    #[error("no tool named {name:?} is registered")]
    ToolNotFound { name: String },
}

/// Errors raised by the simple (spawn-per-call) executor.
#[derive(Debug, Error)]
pub enum SimpleExecError {
    #[error("failed to start process {path}: {source}")]
    StartFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("pipe I/O failed for {path}: {source}")]
    PipeFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("execution of {path} timed out after {timeout_ms}ms")]
    Timeout { path: PathBuf, timeout_ms: u64 },
    #[error("process {path} terminated by signal or could not be reaped: {message}")]
    AbnormalExit { path: PathBuf, message: String },
    #[error("execution of {path} was cancelled by the caller")]
    Cancelled { path: PathBuf },
}

/// Errors raised by the capsule manager.
#[derive(Debug, Error, Clone)]
pub enum CapsuleError {
    #[error("capsule operation invalid in state {state:?}")]
    BadState { state: &'static str },
    #[error("capsule did not send orla.hello within {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },
    #[error("capsule stdin is unavailable")]
    StdinUnavailable,
    #[error("capsule request {id} timed out")]
    RequestTimeout { id: i64 },
    #[error("capsule request {id} was cancelled by the caller")]
    Cancelled { id: i64 },
    #[error("capsule context was cancelled before a response arrived")]
    CapsuleContextCancelled,
    #[error("capsule process crashed: {reason}")]
    CapsuleCrashed { reason: String },
    #[error("capsule was stopped")]
    CapsuleStopped,
    #[error("capsule is not ready to accept calls")]
    NotReady,
    #[error("capsule tool returned a JSON-RPC error {code}: {message}")]
    JsonRpcError { code: i64, message: String },
    #[error("failed to start capsule process: {0}")]
    StartFailure(String),
}

/// Errors raised by the server orchestrator (`src/server`).
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to reload configuration: {0}")]
    ConfigReload(String),
    #[error("failed to register tool {name:?}: {reason}")]
    RegistrationFailed { name: String, reason: String },
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Errors raised while loading configuration (`src/config.rs`).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}
