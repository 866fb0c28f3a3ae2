//! Development-mode hot reload of a route manifest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::EtudeError;
use crate::handler::HandlerRegistry;
use crate::routing::manifest::RouteManifest;
use crate::routing::router::Router;

/// Load `path`, build it against `registry` and publish it on `router`.
///
/// The new table is fully built before the swap; any failure leaves the
/// router serving its current table.
pub fn reload_from_manifest(
    path: &Path,
    registry: &HandlerRegistry,
    router: &Router,
) -> Result<u64, EtudeError> {
    let manifest = RouteManifest::load(path)?;
    router.reload(manifest.to_builder(registry)?)
}

/// Watches a manifest file and republishes the route table on change.
pub struct ManifestWatcher {
    path: PathBuf,
    registry: Arc<HandlerRegistry>,
    router: Arc<Router>,
}

impl ManifestWatcher {
    pub fn new(path: &Path, registry: Arc<HandlerRegistry>, router: Arc<Router>) -> Self {
        Self {
            path: path.to_path_buf(),
            registry,
            router,
        }
    }

    /// Start watching in a background thread. Dropping the returned watcher
    /// stops it.
    ///
    /// The parent directory is watched rather than the file itself, so saves
    /// that replace the file by renaming keep being seen.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path.clone();
        let dir = watch_dir(&self.path);
        let registry = self.registry;
        let router = self.router;

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if (event.kind.is_modify() || event.kind.is_create())
                        && concerns(&event, &path)
                    {
                        tracing::info!("Route manifest change detected, reloading...");
                        match reload_from_manifest(&path, &registry, &router) {
                            Ok(generation) => {
                                tracing::info!(generation, "Routes reloaded");
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload routes: {}. Keeping current routes.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, dir = ?dir, "Route manifest watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn concerns(event: &Event, manifest: &Path) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == manifest.file_name())
}
