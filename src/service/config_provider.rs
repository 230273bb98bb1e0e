// SPDX-License-Identifier: Apache-2.0

use crate::component::Factories;
use crate::config::{Config, ConfigError};
use crate::confmap::{ConfigWatch, Resolver, ResolverSettings};
use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;
use tracing::{debug, info, warn};

/// Source of validated configuration for the service, with change notification and
/// bookkeeping of which configuration last applied successfully.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Resolves, unmarshals and validates the current configuration.
    async fn get(&mut self, factories: &Factories) -> Result<Config, ConfigError>;

    /// Stream that yields whenever a configuration source changed.
    fn watch(&mut self) -> ConfigWatch;

    async fn shutdown(&mut self) -> Result<(), ConfigError>;

    /// The configuration returned by the last `get` is now running.
    fn config_update_succeeded(&mut self) {}

    /// The configuration returned by the last `get` could not be applied.
    fn config_update_failed(&mut self, _err: &(dyn Error + Send + Sync)) {}

    fn last_resolved_config(&self) -> Option<Vec<u8>> {
        None
    }

    fn last_known_good_config(&self) -> Option<Vec<u8>> {
        None
    }
}

/// Resolver backed provider. Keeps serialized snapshots of the last resolved
/// configuration and of the last one that applied successfully.
pub struct DefaultConfigProvider {
    resolver: Resolver,
    last_resolved: Option<Vec<u8>>,
    last_known_good: Option<Vec<u8>>,
}

impl DefaultConfigProvider {
    pub fn new(settings: ResolverSettings) -> Result<Self, ConfigError> {
        Ok(Self {
            resolver: Resolver::new(settings)?,
            last_resolved: None,
            last_known_good: None,
        })
    }

    pub fn from_uris(uris: Vec<String>) -> Result<Self, ConfigError> {
        Self::new(ResolverSettings::new(uris))
    }

    fn snapshot(conf: &Value) -> Option<Vec<u8>> {
        match serde_json::to_vec_pretty(conf) {
            Ok(b) => Some(b),
            Err(e) => {
                debug!(error = %e, "Unable to serialize the effective configuration.");
                None
            }
        }
    }
}

#[async_trait]
impl ConfigProvider for DefaultConfigProvider {
    async fn get(&mut self, factories: &Factories) -> Result<Config, ConfigError> {
        self.last_resolved = None;

        let raw = self
            .resolver
            .resolve()
            .await
            .map_err(ConfigError::resolve)?;

        self.last_resolved = Self::snapshot(&raw);

        let cfg = Config::unmarshal(raw, factories)?;
        cfg.validate()?;

        Ok(cfg)
    }

    fn watch(&mut self) -> ConfigWatch {
        self.resolver.watch()
    }

    async fn shutdown(&mut self) -> Result<(), ConfigError> {
        self.resolver.shutdown().await
    }

    fn config_update_succeeded(&mut self) {
        if let Some(resolved) = &self.last_resolved {
            self.last_known_good = Some(resolved.clone());
        }
    }

    fn config_update_failed(&mut self, err: &(dyn Error + Send + Sync)) {
        warn!(
            error = %err,
            has_last_known_good = self.last_known_good.is_some(),
            "Configuration update failed."
        );
        if self.last_known_good.is_some() {
            info!("The last known good configuration is available for rollback.");
        }
    }

    fn last_resolved_config(&self) -> Option<Vec<u8>> {
        self.last_resolved.clone()
    }

    fn last_known_good_config(&self) -> Option<Vec<u8>> {
        self.last_known_good.clone()
    }
}
