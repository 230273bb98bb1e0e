// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::confmap::provider::{Provider, Retrieved, WatchGuard, split_scheme};
use crate::confmap::{ChangeNotifier, parse_yaml};
use async_trait::async_trait;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SCHEME: &str = "file";

/// Reads YAML files from local disk. Files are watched through their parent
/// directory so that editors replacing the file by rename are still noticed.
pub struct FileProvider;

#[async_trait]
impl Provider for FileProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn retrieve(
        &self,
        uri: &str,
        notifier: Option<ChangeNotifier>,
    ) -> Result<Retrieved, ConfigError> {
        let (_, path) = split_scheme(uri);
        if path.is_empty() {
            return Err(retrieve_err(uri, "file path must not be empty"));
        }

        // Watch before reading; an edit between the two still notifies
        let guard = match notifier {
            None => None,
            Some(notifier) => {
                let target = watch_target(path).map_err(|e| retrieve_err(uri, e))?;
                Some(watch_file(target, notifier).map_err(|e| retrieve_err(uri, e))?)
            }
        };

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| retrieve_err(uri, e))?;
        let conf = parse_yaml(uri, &text)?;

        Ok(match guard {
            Some(guard) => Retrieved::with_guard(conf, guard),
            None => Retrieved::new(conf),
        })
    }
}

fn retrieve_err(uri: &str, e: impl Into<tower::BoxError>) -> ConfigError {
    ConfigError::Retrieve {
        uri: uri.to_string(),
        source: e.into(),
    }
}

/// The absolute path to watch. A file that is missing for the moment, as during an
/// editor's rename, is watched by its absolute path.
fn watch_target(path: &str) -> std::io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(p) => Ok(p),
        Err(_) => std::path::absolute(path),
    }
}

fn watch_file(target: PathBuf, notifier: ChangeNotifier) -> Result<WatchGuard, notify::Error> {
    let dir = target
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = target.file_name().map(|n| n.to_os_string());

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if is_relevant(&event, file_name.as_ref()) {
                    debug!(paths = ?event.paths, "Config file changed.");
                    notifier.changed();
                }
            }
            Err(e) => notifier.failed(ConfigError::Watch(e.to_string())),
        },
        Config::default(),
    )?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    Ok(WatchGuard::new(watcher))
}

fn is_relevant(event: &Event, file_name: Option<&OsString>) -> bool {
    match event.kind {
        EventKind::Access(_) => false,
        _ => event
            .paths
            .iter()
            .any(|p| p.file_name() == file_name.map(|n| n.as_os_str())),
    }
}
