//! Config file loading and filesystem hot-reload.
//!
//! The file format itself is out of scope (§1 "Deliberately out of
//! scope... the config file loader"); this is the minimal loader that
//! satisfies the live-config contract: a reload produces a new snapshot and
//! invokes `Store` (§6 "Config file").

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, info, warn};

use crate::live::LiveConfig;
use crate::model::ConfigFile;

#[derive(Debug, thiserror::Error)]
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
        source: toml::de::Error,
    },
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ConfigFile, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Spawn a filesystem watcher that reloads `path` on every change event and
/// stores the new snapshot into `live`. Returns the watcher; it must be kept
/// alive (dropping it stops the watch).
///
/// Parse failures are logged and the previous snapshot is kept — a broken
/// edit-in-progress config file must never take the process down.
pub fn watch(path: impl AsRef<Path>, live: Arc<LiveConfig>) -> notify::Result<RecommendedWatcher> {
    let path = path.as_ref().to_path_buf();
    let watch_path = path.clone();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "config watcher error");
                return;
            }
        };
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        match load_from_file(&path) {
            Ok(new) => {
                info!(path = %path.display(), "config reloaded");
                live.store(new);
            }
            Err(e) => {
                error!(error = %e, "config reload failed, keeping previous snapshot");
            }
        }
    })?;

    watcher.watch(&watch_path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
