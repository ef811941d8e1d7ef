//! `tool.yaml` manifest parsing and validation (spec §4.3, §6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::tool::RuntimeMode;

/// A parsed, not-yet-validated `tool.yaml` manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifest {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub entrypoint: PathBuf,
    pub author: Option<String>,
    pub license: Option<String>,
    pub repository: Option<String>,
    pub homepage: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub dependencies: HashMap<String, String>,
    #[serde(default)]
    pub mcp: McpDef,
    #[serde(default)]
    pub runtime: RuntimeDef,
}

/// The `mcp` section of a manifest: schemas surfaced to MCP clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpDef {
    pub input_schema: Option<serde_json::Value>,
    pub output_schema: Option<serde_json::Value>,
}

/// The `runtime` section of a manifest: execution-mode configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeDef {
    pub mode: Option<RuntimeMode>,
    pub startup_timeout_ms: Option<u64>,
    pub hot_load: Option<HotLoadDef>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// `runtime.hot_load`: optional file-watch-triggered restart config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotLoadDef {
    #[serde(default)]
    pub watch: Vec<String>,
    pub mode: String,
    #[serde(default)]
    pub debounce_ms: u64,
}

/// Read and parse a `tool.yaml` file from disk.
pub fn load(path: &Path) -> Result<ToolManifest, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// A manifest that has passed validation, with its entrypoint resolved
/// to an absolute path.
pub struct ValidatedManifest {
    pub manifest: ToolManifest,
    pub entrypoint: PathBuf,
    pub version: semver::Version,
}

/// Validate a manifest: required fields must be non-empty, the
/// entrypoint (resolved relative to `manifest_dir`) must exist, be
/// executable, and stay within `root` once canonicalized (spec §4.3:
/// "must have non-empty name/version/description/entrypoint and the
/// entrypoint must exist and be executable", "no symlink may escape
/// the root"), and `version` must parse as semver (spec §7
/// `InvalidSemver`, skip-and-warn).
pub fn validate(manifest: ToolManifest, manifest_path: &Path, root: &Path) -> Result<ValidatedManifest, ManifestError> {
    if manifest.name.trim().is_empty() {
        return Err(ManifestError::MissingField {
            path: manifest_path.to_path_buf(),
            field: "name",
        });
    }
    if manifest.version.trim().is_empty() {
        return Err(ManifestError::MissingField {
            path: manifest_path.to_path_buf(),
            field: "version",
        });
    }
    if manifest.description.trim().is_empty() {
        return Err(ManifestError::MissingField {
            path: manifest_path.to_path_buf(),
            field: "description",
        });
    }

    let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));
    let entrypoint = manifest_dir.join(&manifest.entrypoint);
    let canonical = entrypoint
        .canonicalize()
        .map_err(|_| ManifestError::MissingEntrypoint {
            path: manifest_path.to_path_buf(),
            entrypoint: entrypoint.clone(),
        })?;

    if !crate::discovery::is_within_root(root, &canonical) {
        return Err(ManifestError::EntrypointEscapesRoot {
            path: manifest_path.to_path_buf(),
            entrypoint: canonical,
        });
    }

    let metadata = std::fs::metadata(&canonical).map_err(|_| ManifestError::MissingEntrypoint {
        path: manifest_path.to_path_buf(),
        entrypoint: entrypoint.clone(),
    })?;
    if !metadata.is_file() || !crate::discovery::exec_bit::is_executable(&metadata) {
        return Err(ManifestError::EntrypointNotExecutable {
            path: manifest_path.to_path_buf(),
            entrypoint: entrypoint.clone(),
        });
    }

    let version = semver::Version::parse(manifest.version.trim()).map_err(|source| ManifestError::InvalidSemver {
        path: manifest_path.to_path_buf(),
        version: manifest.version.clone(),
        source,
    })?;

    Ok(ValidatedManifest {
        manifest,
        entrypoint: canonical,
        version,
    })
}
