//! Hot reload of the bridge config file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::BridgeError;
use super::manager::BridgeManager;

/// Quiet period before a burst of file events triggers one reload
pub const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches the directory holding the config file and reloads the bridge
/// set when the file changes. Dropping the watcher stops it.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ConfigWatcher {
    pub fn start(manager: Arc<BridgeManager>) -> Result<Self, BridgeError> {
        let path = manager
            .config_path()
            .map(Path::to_path_buf)
            .ok_or_else(|| BridgeError::Config("No bridge config path".to_string()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| BridgeError::Config(format!("Not a file path: {:?}", path)))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()))
                {
                    let _ = tx.send(());
                }
            }
            Err(e) => warn!("Config watcher error: {}", e),
        })
        .map_err(|e| BridgeError::Config(format!("Cannot watch {:?}: {}", dir, e)))?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| BridgeError::Config(format!("Cannot watch {:?}: {}", dir, e)))?;
        info!("Watching {:?} for bridge changes", path);

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Coalesce the burst an editor save produces
                loop {
                    match tokio::time::timeout(RELOAD_DEBOUNCE, rx.recv()).await {
                        Ok(Some(())) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                debug!("Bridge config changed, reloading");
                if let Err(e) = manager.reload_from_file().await {
                    warn!("Bridge reload failed: {}", e);
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
