//! Tools registry (spec §4.4): the authoritative `name -> ToolDescriptor`
//! map.
//!
//! Mirrors the shape of the teacher's `ToolRegistry` (a map plus a stable
//! list), but carries the richer [`ToolDescriptor`] and enforces the
//! uniqueness/lookup contract from spec §3/§4.4 instead of bundling tool
//! handlers directly — handler construction is the orchestrator's job
//! (`src/server`).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::tool::ToolDescriptor;

/// In-memory map of tool name to descriptor.
///
/// Not intrinsically thread-safe; the orchestrator is expected to hold it
/// behind a lock or rebuild-and-swap an `Arc<ToolsRegistry>` (spec §4.4,
/// §9 "Registry rebuild under concurrency").
#[derive(Debug, Default, Clone)]
pub struct ToolsRegistry {
    tools: HashMap<String, Arc<ToolDescriptor>>,
}

impl ToolsRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Insert a descriptor. Fails if a tool with the same name already
    /// exists.
    pub fn add(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.tools.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateToolName {
                name: descriptor.name,
            });
        }
        self.tools.insert(descriptor.name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<ToolDescriptor>, RegistryError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::ToolNotFound {
                name: name.to_string(),
            })
    }

    /// A snapshot of all registered tools. Order is unspecified but
    /// stable within a single call.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ToolDescriptor>> {
        self.tools.values().cloned().collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Build a registry from a name -> descriptor map that's already been
    /// deduplicated (used by discovery's merge step, spec §4.3).
    #[must_use]
    pub fn from_map(tools: HashMap<String, ToolDescriptor>) -> Self {
        Self {
            tools: tools
                .into_iter()
                .map(|(name, descriptor)| (name, Arc::new(descriptor)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::RuntimeMode;
    use std::path::PathBuf;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: String::new(),
            path: PathBuf::from(format!("/tools/{name}")),
            interpreter: String::new(),
            input_schema: None,
            output_schema: None,
            runtime_mode: RuntimeMode::Simple,
            startup_timeout_ms: crate::tool::DEFAULT_STARTUP_TIMEOUT_MS,
            env: HashMap::new(),
            extra_args: Vec::new(),
        }
    }

    #[test]
    fn add_and_get() {
        let mut reg = ToolsRegistry::new();
        reg.add(descriptor("echo")).unwrap();
        assert_eq!(reg.get("echo").unwrap().name, "echo");
    }

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = ToolsRegistry::new();
        reg.add(descriptor("echo")).unwrap();
        let err = reg.add(descriptor("echo")).unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateToolName {
                name: "echo".into()
            }
        );
    }

    #[test]
    fn missing_name_not_found() {
        let reg = ToolsRegistry::new();
        let err = reg.get("missing").unwrap_err();
        assert_eq!(
            err,
            RegistryError::ToolNotFound {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn list_returns_all() {
        let mut reg = ToolsRegistry::new();
        reg.add(descriptor("a")).unwrap();
        reg.add(descriptor("b")).unwrap();
        let mut names: Vec<_> = reg.list().iter().map(|t| t.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }
}
