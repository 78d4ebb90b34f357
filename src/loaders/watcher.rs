//! File watcher for layer hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches the file behind one layer and reports the layer name on change.
///
/// The parent directory is watched rather than the file, so editors that
/// save by replacing the file are still seen.
pub struct LayerWatcher {
    layer: String,
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<String>,
}

impl LayerWatcher {
    /// Create a watcher that sends `layer` on `update_tx`.
    ///
    /// Several watchers may share one channel.
    pub fn new(layer: impl Into<String>, path: &Path, update_tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            layer: layer.into(),
            path: path.to_path_buf(),
            update_tx,
        }
    }

    /// Start watching in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let layer = self.layer.clone();
        let target = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_reload_event(&event, &target) {
                        tracing::info!(layer = %layer, path = %target.display(), "Config file change detected, reloading...");
                        let _ = tx.send(layer.clone());
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(layer = %self.layer, path = ?self.path, "Layer watcher started");
        Ok(watcher)
    }
}

/// A modify or create event touching `target`.
pub fn is_reload_event(event: &Event, target: &Path) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    let Some(name) = target.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_reload_event_filter() {
        let target = Path::new("/etc/app/site.yaml");

        assert!(is_reload_event(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/app/site.yaml"),
            target
        ));
        assert!(is_reload_event(
            &event(EventKind::Create(CreateKind::File), "/etc/app/site.yaml"),
            target
        ));
        assert!(!is_reload_event(
            &event(EventKind::Modify(ModifyKind::Any), "/etc/app/other.yaml"),
            target
        ));
        assert!(!is_reload_event(
            &event(EventKind::Remove(RemoveKind::File), "/etc/app/site.yaml"),
            target
        ));
    }

    #[test]
    fn test_sender_shared_between_watchers() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let a = LayerWatcher::new("user", Path::new("user.yaml"), tx.clone());
        let b = LayerWatcher::new("site", Path::new("site.toml"), tx);
        assert_eq!(a.layer, "user");
        assert_eq!(b.path, PathBuf::from("site.toml"));
    }
}
