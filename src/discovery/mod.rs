//! Tool discovery (spec §4.3): scanning the flat tools directory and the
//! versioned install directory into a single `name -> ToolDescriptor` map.

pub mod exec_bit;
pub mod manifest;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::DiscoveryError;
use crate::shebang;
use crate::tool::{RuntimeMode, ToolDescriptor, DEFAULT_STARTUP_TIMEOUT_MS};

/// Scan a flat directory of executables into a `name -> ToolDescriptor`
/// map (spec §4.3 "Directory scan").
///
/// A non-existent root is not an error: it yields an empty map, since the
/// server may start before any tools are installed. A root that exists
/// but isn't a directory is an error.
pub fn scan_tools_dir(root: &Path) -> Result<HashMap<String, ToolDescriptor>, DiscoveryError> {
    if !root.exists() {
        debug!(root = %root.display(), "tools directory does not exist, yielding empty registry");
        return Ok(HashMap::new());
    }
    if !root.is_dir() {
        return Err(DiscoveryError::NotADirectory(root.to_path_buf()));
    }

    let mut tools: HashMap<String, ToolDescriptor> = HashMap::new();
    let mut sources: HashMap<String, PathBuf> = HashMap::new();

    let entries = std::fs::read_dir(root).map_err(|source| DiscoveryError::ReadDir {
        path: root.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| DiscoveryError::ReadDir {
            path: root.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if !is_within_root(root, &path) {
            warn!(path = %path.display(), "skipping entry that escapes the tools root");
            continue;
        }

        let Ok(metadata) = std::fs::metadata(&path) else {
            continue;
        };
        if !metadata.is_file() || !exec_bit::is_executable(&metadata) {
            continue;
        }

        let name = shebang::tool_name_from_filename(&path);

        if let Some(existing) = sources.get(&name) {
            return Err(DiscoveryError::DuplicateToolName {
                name,
                existing: existing.clone(),
                duplicate: path,
            });
        }

        let interpreter = match shebang::interpreter_or_native(&path) {
            Ok(interpreter) => interpreter,
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to read tool file");
                None
            }
        };

        let descriptor = ToolDescriptor {
            name: name.clone(),
            description: String::new(),
            path: path.clone(),
            interpreter: interpreter.unwrap_or_default(),
            input_schema: None,
            output_schema: None,
            runtime_mode: RuntimeMode::Simple,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            env: HashMap::new(),
            extra_args: Vec::new(),
        };

        sources.insert(name.clone(), path);
        tools.insert(name, descriptor);
    }

    info!(count = tools.len(), root = %root.display(), "directory scan complete");
    Ok(tools)
}

/// Scan the versioned install directory (`<home>/.orla/tools/<name>/
/// <version>/tool.yaml`) into a `name -> ToolDescriptor` map (spec §4.3
/// "Install scan").
///
/// Individual manifests that fail validation are skipped with a warning;
/// only a structural failure to read the root directory itself is
/// propagated, and a missing root is treated as empty (same rule as the
/// directory scan).
pub fn scan_install_dir(root: &Path) -> HashMap<String, ToolDescriptor> {
    let mut tools: HashMap<String, ToolDescriptor> = HashMap::new();
    let mut versions: HashMap<String, semver::Version> = HashMap::new();

    if !root.exists() {
        debug!(root = %root.display(), "install directory does not exist, yielding empty registry");
        return tools;
    }

    let name_dirs = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %root.display(), error = %err, "failed to read install directory");
            return tools;
        }
    };

    for name_dir in name_dirs.flatten() {
        let name_path = name_dir.path();
        if !name_path.is_dir() {
            continue;
        }

        let version_dirs = match std::fs::read_dir(&name_path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %name_path.display(), error = %err, "failed to read tool version directory");
                continue;
            }
        };

        for version_dir in version_dirs.flatten() {
            let version_path = version_dir.path();
            if !version_path.is_dir() {
                continue;
            }
            let manifest_path = version_path.join("tool.yaml");
            if !manifest_path.is_file() {
                continue;
            }

            match load_and_validate(&manifest_path, root) {
                Ok((descriptor, version)) => {
                    upsert_by_version(&mut tools, &mut versions, descriptor, version);
                }
                Err(reason) => {
                    warn!(path = %manifest_path.display(), %reason, "skipping invalid tool manifest");
                }
            }
        }
    }

    info!(count = tools.len(), root = %root.display(), "install scan complete");
    tools
}

/// Load, validate, and convert one `tool.yaml` into a descriptor, along
/// with its parsed semver for collision resolution in
/// [`scan_install_dir`]. `install_root` bounds the entrypoint containment
/// check (spec §4.3 "Path traversal safety").
fn load_and_validate(manifest_path: &Path, install_root: &Path) -> Result<(ToolDescriptor, semver::Version), String> {
    let raw = manifest::load(manifest_path).map_err(|e| e.to_string())?;
    let validated = manifest::validate(raw, manifest_path, install_root).map_err(|e| e.to_string())?;

    let interpreter = shebang::interpreter_or_native(&validated.entrypoint)
        .map_err(|e| e.to_string())?
        .unwrap_or_default();

    let runtime = &validated.manifest.runtime;
    let descriptor = ToolDescriptor {
        name: validated.manifest.name.clone(),
        description: validated.manifest.description.clone(),
        path: validated.entrypoint,
        interpreter,
        input_schema: validated.manifest.mcp.input_schema.clone(),
        output_schema: validated.manifest.mcp.output_schema.clone(),
        runtime_mode: runtime.mode.unwrap_or(RuntimeMode::Simple),
        startup_timeout_ms: runtime.startup_timeout_ms.unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS),
        env: runtime.env.clone(),
        extra_args: runtime.args.clone(),
    };
    Ok((descriptor, validated.version))
}

/// Resolve a name collision within the install scan by semantic-version
/// comparison: the newer version wins (spec §4.3). Manifests with an
/// unparseable `version` never reach here — `manifest::validate` rejects
/// them outright (skip-and-warn via `ManifestError::InvalidSemver`).
fn upsert_by_version(
    tools: &mut HashMap<String, ToolDescriptor>,
    versions: &mut HashMap<String, semver::Version>,
    descriptor: ToolDescriptor,
    incoming_version: semver::Version,
) {
    let name = descriptor.name.clone();
    match versions.get(&name) {
        None => {
            versions.insert(name.clone(), incoming_version);
            tools.insert(name, descriptor);
        }
        Some(existing_version) => {
            if incoming_version > *existing_version {
                versions.insert(name.clone(), incoming_version);
                tools.insert(name, descriptor);
            } else {
                debug!(name = %name, "keeping existing tool version over older candidate");
            }
        }
    }
}

/// Merge directory-scan and install-scan results: on name collision the
/// install-scan entry wins, since it carries richer metadata (spec
/// §4.3's "Merge").
#[must_use]
pub fn merge(
    dir_scan: HashMap<String, ToolDescriptor>,
    install_scan: HashMap<String, ToolDescriptor>,
) -> HashMap<String, ToolDescriptor> {
    let mut merged = dir_scan;
    for (name, descriptor) in install_scan {
        if merged.contains_key(&name) {
            debug!(name = %name, "install-scan tool overrides directory-scan tool of the same name");
        }
        merged.insert(name, descriptor);
    }
    merged
}

/// Verify that `candidate`, once resolved, is a descendant of `root`
/// (spec §4.3 "Path traversal safety"). This is the fallback path the
/// spec allows when no rooted-directory facility is used: every entry
/// produced by `read_dir(root)` is already physically inside `root`, so
/// this only matters once symlinks are canonicalized elsewhere (e.g. in
/// manifest entrypoint resolution, which calls `canonicalize` and relies
/// on the OS to fail on dangling/cyclic links).
pub(crate) fn is_within_root(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt as _;
    use tempfile::TempDir;

    fn write_script(dir: &Path, name: &str, contents: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn missing_tools_dir_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = scan_tools_dir(&missing).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn tools_path_not_a_directory_is_error() {
        let dir = TempDir::new().unwrap();
        let file_path = write_script(dir.path(), "notadir", "#!/bin/sh\n", 0o644);
        assert!(matches!(
            scan_tools_dir(&file_path),
            Err(DiscoveryError::NotADirectory(_))
        ));
    }

    #[test]
    fn discovers_executable_with_shebang() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "echo-tool.sh", "#!/bin/sh\necho \"$1\"\n", 0o755);
        let tools = scan_tools_dir(dir.path()).unwrap();
        let tool = tools.get("echo-tool").unwrap();
        assert_eq!(tool.interpreter, "/bin/sh");
        assert!(tool.path.ends_with("echo-tool.sh"));
    }

    #[test]
    fn non_executable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "not-a-tool.sh", "#!/bin/sh\n", 0o644);
        let tools = scan_tools_dir(dir.path()).unwrap();
        assert!(tools.is_empty());
    }

    #[test]
    fn native_binary_without_shebang_has_empty_interpreter() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "binary-tool", "\u{7f}ELF\0\0\0", 0o755);
        let tools = scan_tools_dir(dir.path()).unwrap();
        assert_eq!(tools.get("binary-tool").unwrap().interpreter, "");
    }

    #[test]
    fn duplicate_stem_across_extensions_is_error() {
        let dir = TempDir::new().unwrap();
        write_script(dir.path(), "deploy.sh", "#!/bin/sh\n", 0o755);
        write_script(dir.path(), "deploy.py", "#!/usr/bin/env python3\n", 0o755);
        assert!(matches!(
            scan_tools_dir(dir.path()),
            Err(DiscoveryError::DuplicateToolName { .. })
        ));
    }

    #[test]
    fn merge_prefers_install_scan_entry() {
        let dir_scan_entry = ToolDescriptor {
            name: "dup".into(),
            description: "from dir scan".into(),
            path: PathBuf::from("/tools/dup"),
            interpreter: String::new(),
            input_schema: None,
            output_schema: None,
            runtime_mode: RuntimeMode::Simple,
            startup_timeout_ms: DEFAULT_STARTUP_TIMEOUT_MS,
            env: HashMap::new(),
            extra_args: Vec::new(),
        };
        let install_entry = ToolDescriptor {
            description: "from install scan".into(),
            ..dir_scan_entry.clone()
        };

        let mut dir_scan = HashMap::new();
        dir_scan.insert("dup".to_string(), dir_scan_entry);
        let mut install_scan = HashMap::new();
        install_scan.insert("dup".to_string(), install_entry);

        let merged = merge(dir_scan, install_scan);
        assert_eq!(merged.get("dup").unwrap().description, "from install scan");
    }

    #[test]
    fn install_scan_picks_newer_semver_on_collision() {
        let dir = TempDir::new().unwrap();
        let home = dir.path();
        let tool_root = home.join(".orla/tools/greet");
        for version in ["1.0.0", "2.0.0"] {
            let version_dir = tool_root.join(version);
            std::fs::create_dir_all(&version_dir).unwrap();
            write_script(&version_dir, "run.sh", "#!/bin/sh\necho hi\n", 0o755);
            let manifest = format!(
                "name: greet\nversion: \"{version}\"\ndescription: greets you\nentrypoint: run.sh\n"
            );
            std::fs::write(version_dir.join("tool.yaml"), manifest).unwrap();
        }

        let tools = scan_install_dir(&home.join(".orla/tools"));
        let greet = tools.get("greet").unwrap();
        assert!(greet.path.to_string_lossy().contains("2.0.0"));
    }
}
