//! Optional hot-reload file watcher (spec §0.6 supplemented feature):
//! watches the tools directory and the install directory, debounces
//! bursts of filesystem events, and signals the orchestrator to
//! `Reload()`.
//!
//! Grounded in the teacher pack's capsule watcher
//! (`astrid-capsule/src/watcher.rs`), simplified to the server's actual
//! need: a debounced "something changed" signal rather than per-capsule
//! content hashing, since `Reload()` already re-discovers and diffs
//! descriptors on every call.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Coalescing window for bursts of filesystem events (spec §6
/// `runtime.hot_load.debounce_ms`'s server-level analogue).
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches `paths` for content-changing events and sends a signal on
/// `tx` at most once per `debounce` window.
pub struct ReloadWatcher {
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    debounce: Duration,
}

impl ReloadWatcher {
    /// Start watching `paths`. Paths that don't exist yet are skipped
    /// with a warning rather than failing construction — tools
    /// directories are legitimately absent until the first install.
    pub fn new(paths: &[PathBuf], debounce: Duration) -> notify::Result<Self> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )?;

        for path in paths {
            if !path.exists() {
                warn!(path = %path.display(), "watch path does not exist yet, skipping");
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => info!(path = %path.display(), "watching for tool changes"),
                Err(err) => warn!(path = %path.display(), error = %err, "failed to watch path"),
            }
        }

        Ok(Self {
            _watcher: watcher,
            raw_rx,
            debounce,
        })
    }

    /// Run the debounce loop, invoking `on_reload` at most once per
    /// debounce window after the first qualifying event. Returns when
    /// the underlying `notify` channel closes.
    pub async fn run<F, Fut>(mut self, mut on_reload: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            let Some(result) = self.raw_rx.recv().await else {
                debug!("watcher channel closed, stopping");
                return;
            };

            match result {
                Ok(event) if is_content_change(&event.kind) => {
                    self.drain_burst().await;
                    on_reload().await;
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "filesystem watcher error"),
            }
        }
    }

    /// After the first qualifying event, swallow anything else that
    /// arrives within the debounce window so a burst of writes (e.g. an
    /// `rsync` of a new tool version) triggers one reload, not N.
    async fn drain_burst(&mut self) {
        let deadline = tokio::time::sleep(self.debounce);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => return,
                event = self.raw_rx.recv() => {
                    if event.is_none() {
                        return;
                    }
                }
            }
        }
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Convenience entry point used by `main`: spawn a background task that
/// reloads `orchestrator` whenever `paths` change.
pub fn spawn(
    paths: Vec<PathBuf>,
    tools_dir: PathBuf,
    install_dir: PathBuf,
    orchestrator: std::sync::Arc<crate::server::Orchestrator>,
) -> Option<tokio::task::JoinHandle<()>> {
    let watcher = match ReloadWatcher::new(&paths, DEFAULT_DEBOUNCE) {
        Ok(watcher) => watcher,
        Err(err) => {
            warn!(error = %err, "failed to initialize hot-reload watcher, continuing without it");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        watcher
            .run(|| {
                let orchestrator = std::sync::Arc::clone(&orchestrator);
                let tools_dir = tools_dir.clone();
                let install_dir = install_dir.clone();
                async move {
                    info!("tools directory changed, reloading");
                    if let Err(err) = orchestrator.reload(&tools_dir, &install_dir).await {
                        warn!(error = %err, "reload failed");
                    }
                }
            })
            .await;
    }))
}
