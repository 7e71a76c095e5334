//! Directory watcher for automatic re-discovery.
//!
//! Uses the `notify` crate to watch discovery paths and re-run the scan when
//! component sources change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::Discovery;
use crate::error::{Error, Result};
use crate::registry::{ComponentType, Registry};

const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Re-runs discovery when watched paths change.
///
/// New component classes are registered as they appear. Entries whose backing
/// file disappears are unregistered. Entries without a backing file, such as
/// built-ins, are never touched.
pub struct DiscoveryWatcher {
    discovery: Arc<Discovery>,
    registry: Arc<Registry>,
    paths: Vec<PathBuf>,
    debounce_ms: u64,
    watcher: Option<RecommendedWatcher>,
    pending: Arc<RwLock<Vec<PathBuf>>>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DiscoveryWatcher {
    pub fn new(discovery: Arc<Discovery>, registry: Arc<Registry>, paths: Vec<PathBuf>) -> Self {
        Self {
            discovery,
            registry,
            paths,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            watcher: None,
            pending: Arc::new(RwLock::new(Vec::new())),
            stop: CancellationToken::new(),
            task: None,
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Start watching. Changes are debounced before a rescan runs.
    pub fn start(&mut self) -> Result<()> {
        let pending_clone = self.pending.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        return;
                    }
                    if let Ok(mut pending) = pending_clone.try_write() {
                        pending.extend(event.paths);
                    }
                }
                Err(e) => {
                    error!("watch error: {:?}", e);
                }
            },
            Config::default(),
        )
        .map_err(|e| Error::Internal(format!("failed to create watcher: {}", e)))?;

        let mut watched = 0;
        for path in &self.paths {
            if !path.exists() {
                debug!(path = %path.display(), "skipping missing watch path");
                continue;
            }
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|e| Error::Internal(format!("failed to watch directory: {}", e)))?;
            watched += 1;
        }
        self.watcher = Some(watcher);

        let discovery = self.discovery.clone();
        let registry = self.registry.clone();
        let paths = self.paths.clone();
        let pending = self.pending.clone();
        let debounce_ms = self.debounce_ms;
        let stop = self.stop.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(debounce_ms)) => {}
                }

                let changed: Vec<PathBuf> = {
                    let mut pending = pending.write().await;
                    std::mem::take(&mut *pending)
                };

                if !changed.is_empty() {
                    debug!("rescanning after {} file changes", changed.len());
                    resync(&discovery, &registry, &paths);
                }
            }
        }));

        info!(paths = watched, "discovery watcher started");
        Ok(())
    }

    /// Stop watching and wait for the rescan task to finish.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        self.watcher = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("discovery watcher task ended abnormally: {}", e);
            }
        }
        info!("discovery watcher stopped");
    }

    /// Number of changes waiting for the next debounce flush.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

/// Bring the registries back in line with what is on disk.
fn resync(discovery: &Discovery, registry: &Registry, paths: &[PathBuf]) {
    let discovered = discovery.discover(paths);

    let mut added = 0;
    for component in discovered.all() {
        if registry.has(component.kind, &component.name) {
            continue;
        }
        match registry.register_deferred(
            component.kind,
            &component.name,
            &component.class_ident,
            component.metadata(),
        ) {
            Ok(()) => {
                info!(kind = %component.kind, name = %component.name, "registered new component");
                added += 1;
            }
            Err(err) => {
                warn!(
                    kind = %component.kind,
                    name = %component.name,
                    error = %err,
                    "failed to register new component"
                );
            }
        }
    }

    let mut removed = 0;
    for kind in ComponentType::all() {
        for name in registry.names(kind) {
            let meta = match registry.metadata(kind, &name) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if let Some(file_path) = meta.get("file_path").and_then(|v| v.as_str()) {
                if !Path::new(file_path).exists() && registry.unregister(kind, &name) {
                    info!(kind = %kind, name = %name, "unregistered removed component");
                    removed += 1;
                }
            }
        }
    }

    if added > 0 || removed > 0 {
        debug!(added, removed, "registry resynced");
    }
}
