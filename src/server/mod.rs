//! Server orchestrator (spec §4.7): binds the tools registry to an RPC
//! surface, owns the set of live capsule managers, and supports hot
//! reload.

pub mod handler;
pub mod http;
pub mod protocol;
pub mod stdio;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::config::ServerConfig;
use crate::discovery;
use crate::error::OrchestratorError;
use crate::executor::capsule::CapsuleHandle;
use crate::registry::ToolsRegistry;
use crate::server::handler::{build_handler, ExecutionStrategy, ToolHandler};
use crate::tool::{RuntimeMode, ToolDescriptor};

/// The set of method names the transport currently recognizes: one
/// handler per registered tool (spec's GLOSSARY "RPC surface").
pub type RpcSurface = HashMap<String, ToolHandler>;

struct OrchestratorState {
    registry: ToolsRegistry,
    surface: Arc<RpcSurface>,
    capsules: HashMap<String, Arc<CapsuleHandle>>,
    registered_tools: HashSet<String>,
}

/// Server metadata reported in MCP `initialize` responses.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Owns the live [`ToolsRegistry`], the current [`RpcSurface`], and the
/// map of active capsule managers; coordinates reload (spec §4.7).
pub struct Orchestrator {
    state: RwLock<OrchestratorState>,
    clock: SharedClock,
    config: ServerConfig,
    pub info: ServerInfo,
}

impl Orchestrator {
    /// Build an orchestrator from a fully-populated registry, starting
    /// every capsule-mode tool it contains.
    pub async fn new(
        registry: ToolsRegistry,
        config: ServerConfig,
        clock: SharedClock,
        info: ServerInfo,
    ) -> Self {
        let (surface, capsules, registered_tools) =
            build_surface(&registry, None, &HashMap::new(), &config, &clock).await;

        Self {
            state: RwLock::new(OrchestratorState {
                registry,
                surface: Arc::new(surface),
                capsules,
                registered_tools,
            }),
            clock,
            config,
            info,
        }
    }

    /// A snapshot of the current RPC surface, safe to hold across an
    /// individual call even if a concurrent `Reload` swaps it out from
    /// under the orchestrator (spec §9 "copy-on-swap").
    pub async fn surface(&self) -> Arc<RpcSurface> {
        Arc::clone(&self.state.read().await.surface)
    }

    pub async fn registered_tool_names(&self) -> Vec<String> {
        self.state.read().await.registered_tools.iter().cloned().collect()
    }

    /// Snapshot of every registered tool's descriptor, for `tools/list`.
    pub async fn list_tools(&self) -> Vec<Arc<ToolDescriptor>> {
        self.state.read().await.registry.list()
    }

    /// Re-run discovery and rebuild the RPC surface, restarting only the
    /// capsules whose descriptor actually changed (spec §4.7 "Reload",
    /// resolved Open Question in DESIGN.md).
    pub async fn reload(&self, tools_dir: &std::path::Path, install_dir: &std::path::Path) -> Result<(), OrchestratorError> {
        let dir_scan = discovery::scan_tools_dir(tools_dir)?;
        let install_scan = discovery::scan_install_dir(install_dir);
        let merged = discovery::merge(dir_scan, install_scan);
        let new_registry = ToolsRegistry::from_map(merged);

        let mut state = self.state.write().await;

        let (surface, capsules, registered_tools) = build_surface(
            &new_registry,
            Some(&state.registry),
            &state.capsules,
            &self.config,
            &self.clock,
        )
        .await;

        let stale: Vec<String> = state
            .capsules
            .keys()
            .filter(|name| !capsules.contains_key(*name))
            .cloned()
            .collect();
        for name in stale {
            if let Some(handle) = state.capsules.get(&name) {
                info!(tool = %name, "stopping capsule removed or changed on reload");
                handle.stop().await;
            }
        }

        state.registry = new_registry;
        state.surface = Arc::new(surface);
        state.capsules = capsules;
        state.registered_tools = registered_tools;

        Ok(())
    }
}

/// Build a fresh RPC surface and capsule set from `registry`, reusing
/// any existing capsule handle whose descriptor is unchanged (spec §9
/// Open Question: diff descriptors rather than unconditionally
/// restarting).
async fn build_surface(
    registry: &ToolsRegistry,
    old_registry: Option<&ToolsRegistry>,
    existing_capsules: &HashMap<String, Arc<CapsuleHandle>>,
    config: &ServerConfig,
    clock: &SharedClock,
) -> (RpcSurface, HashMap<String, Arc<CapsuleHandle>>, HashSet<String>) {
    let mut surface = RpcSurface::new();
    let mut capsules = HashMap::new();
    let mut registered = HashSet::new();
    let call_timeout = Duration::from_secs(config.timeout);

    for descriptor in registry.list() {
        match descriptor.runtime_mode {
            RuntimeMode::Simple => {
                let handler = build_handler(
                    Arc::clone(&descriptor),
                    ExecutionStrategy::Simple {
                        clock: Arc::clone(clock),
                        timeout: call_timeout,
                    },
                );
                surface.insert(descriptor.name.clone(), handler);
                registered.insert(descriptor.name.clone());
            }
            RuntimeMode::Capsule => {
                let unchanged = old_registry
                    .and_then(|old| old.get(&descriptor.name).ok())
                    .is_some_and(|old_descriptor| old_descriptor == descriptor);

                let started = if unchanged {
                    match existing_capsules.get(&descriptor.name) {
                        Some(handle) => Ok(Arc::clone(handle)),
                        None => start_capsule(&descriptor, clock).await,
                    }
                } else {
                    if let Some(stale) = existing_capsules.get(&descriptor.name) {
                        info!(tool = %descriptor.name, "descriptor changed, restarting capsule");
                        stale.stop().await;
                    }
                    start_capsule(&descriptor, clock).await
                };

                let handler = match started {
                    Ok(handle) => {
                        let handler = build_handler(
                            Arc::clone(&descriptor),
                            ExecutionStrategy::Capsule {
                                handle: Arc::clone(&handle),
                                timeout: call_timeout,
                            },
                        );
                        capsules.insert(descriptor.name.clone(), handle);
                        handler
                    }
                    Err(reason) => build_handler(Arc::clone(&descriptor), ExecutionStrategy::Unavailable { reason }),
                };
                surface.insert(descriptor.name.clone(), handler);
                registered.insert(descriptor.name.clone());
            }
        }
    }

    (surface, capsules, registered)
}

/// Start a capsule, returning the failure reason rather than discarding
/// it: a tool whose capsule fails to start still gets registered in the
/// RPC surface, reporting the reason on every call (spec §4.7).
async fn start_capsule(descriptor: &Arc<ToolDescriptor>, clock: &SharedClock) -> Result<Arc<CapsuleHandle>, String> {
    let handle = Arc::new(CapsuleHandle::new(Arc::clone(descriptor), Arc::clone(clock)));
    match handle.start().await {
        Ok(()) => Ok(handle),
        Err(err) => {
            warn!(tool = %descriptor.name, error = %err, "failed to start capsule, registering as unavailable");
            Err(err.to_string())
        }
    }
}

/// Directory layout used by discovery and reload.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub tools_dir: PathBuf,
    pub install_dir: PathBuf,
}
