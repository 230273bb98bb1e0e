// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::confmap::provider::{Provider, Retrieved, split_scheme};
use crate::confmap::{ChangeNotifier, parse_yaml};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::env::VarError;
use tracing::debug;

pub const SCHEME: &str = "env";

/// Reads a YAML document from an environment variable, as in `env:ROTEL_CONFIG`.
/// An unset variable yields an empty document.
pub struct EnvProvider;

#[async_trait]
impl Provider for EnvProvider {
    fn scheme(&self) -> &str {
        SCHEME
    }

    async fn retrieve(
        &self,
        uri: &str,
        _notifier: Option<ChangeNotifier>,
    ) -> Result<Retrieved, ConfigError> {
        let (_, name) = split_scheme(uri);
        if name.is_empty() {
            return Err(ConfigError::Retrieve {
                uri: uri.to_string(),
                source: "environment variable name must not be empty".into(),
            });
        }

        match std::env::var(name) {
            Ok(text) => Ok(Retrieved::new(parse_yaml(uri, &text)?)),
            Err(VarError::NotPresent) => {
                debug!(variable = name, "Config environment variable is not set.");
                Ok(Retrieved::new(Value::Object(Map::new())))
            }
            Err(e) => Err(ConfigError::Retrieve {
                uri: uri.to_string(),
                source: e.into(),
            }),
        }
    }
}
