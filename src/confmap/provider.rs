// SPDX-License-Identifier: Apache-2.0

pub mod env;
pub mod file;
pub mod http;
pub mod yaml;

pub use env::EnvProvider;
pub use file::FileProvider;
pub use http::HttpProvider;
pub use yaml::YamlProvider;

use crate::config::ConfigError;
use crate::confmap::ChangeNotifier;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Fetches configuration documents for one URI scheme.
#[async_trait]
pub trait Provider: Send + Sync {
    fn scheme(&self) -> &str;

    /// Returns the document behind `uri`. When a notifier is given and the source can
    /// be watched, the returned value carries a guard that keeps the watch alive.
    async fn retrieve(
        &self,
        uri: &str,
        notifier: Option<ChangeNotifier>,
    ) -> Result<Retrieved, ConfigError>;

    async fn shutdown(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

pub struct Retrieved {
    conf: Value,
    guard: Option<WatchGuard>,
}

impl Retrieved {
    pub fn new(conf: Value) -> Self {
        Self { conf, guard: None }
    }

    pub fn with_guard(conf: Value, guard: WatchGuard) -> Self {
        Self {
            conf,
            guard: Some(guard),
        }
    }

    pub fn conf(&self) -> &Value {
        &self.conf
    }

    pub fn into_parts(self) -> (Value, Option<WatchGuard>) {
        (self.conf, self.guard)
    }
}

/// Owns whatever keeps a source watch running. Dropping it stops the watch.
pub struct WatchGuard {
    _inner: Mutex<Box<dyn Send>>,
}

impl WatchGuard {
    pub fn new(inner: impl Send + 'static) -> Self {
        Self {
            _inner: Mutex::new(Box::new(inner)),
        }
    }
}

pub fn default_providers() -> Vec<Arc<dyn Provider>> {
    vec![
        Arc::new(FileProvider),
        Arc::new(EnvProvider),
        Arc::new(YamlProvider),
        Arc::new(HttpProvider::new()),
    ]
}

/// Splits `scheme:rest`. URIs without a scheme are file paths.
pub(crate) fn split_scheme(uri: &str) -> (&str, &str) {
    if let Some((scheme, rest)) = uri.split_once(':') {
        let valid = scheme.len() > 1
            && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if valid {
            return (scheme, rest);
        }
    }
    (file::SCHEME, uri)
}
