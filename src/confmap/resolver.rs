// SPDX-License-Identifier: Apache-2.0

use crate::config::ConfigError;
use crate::confmap::provider::{Provider, WatchGuard, default_providers, split_scheme};
use crate::confmap::{
    ChangeNotifier, ConfigWatch, Converter, ExpandConverter, merge, watch_channel,
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ResolverSettings {
    /// Sources in merge order; later URIs override earlier ones.
    pub uris: Vec<String>,
    pub providers: Vec<Arc<dyn Provider>>,
    pub converters: Vec<Arc<dyn Converter>>,
}

impl ResolverSettings {
    /// The file, env, yaml and http providers followed by variable expansion.
    pub fn new(uris: Vec<String>) -> Self {
        Self {
            uris,
            providers: default_providers(),
            converters: vec![Arc::new(ExpandConverter::default())],
        }
    }
}

pub struct Resolver {
    uris: Vec<String>,
    providers: HashMap<String, Arc<dyn Provider>>,
    converters: Vec<Arc<dyn Converter>>,
    notifier: Option<ChangeNotifier>,
    watch: Option<ConfigWatch>,
    guards: Vec<WatchGuard>,
}

impl Resolver {
    pub fn new(settings: ResolverSettings) -> Result<Self, ConfigError> {
        if settings.uris.is_empty() {
            return Err(ConfigError::NoUris);
        }

        let providers: HashMap<String, Arc<dyn Provider>> = settings
            .providers
            .into_iter()
            .map(|p| (p.scheme().to_string(), p))
            .collect();

        for uri in &settings.uris {
            let (scheme, _) = split_scheme(uri);
            if !providers.contains_key(scheme) {
                return Err(ConfigError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    uri: uri.clone(),
                });
            }
        }

        let (notifier, watch) = watch_channel();
        Ok(Self {
            uris: settings.uris,
            providers,
            converters: settings.converters,
            notifier: Some(notifier),
            watch: Some(watch),
            guards: Vec::new(),
        })
    }

    /// Retrieves every source in order, merges them and applies the converters.
    /// The watches of the previous successful call stay in place until this one
    /// succeeds, so a broken edit can still be followed by a fixing one.
    pub async fn resolve(&mut self) -> Result<Value, ConfigError> {
        let notifier = self.notifier.clone().ok_or(ConfigError::Shutdown)?;

        let mut guards = Vec::with_capacity(self.uris.len());
        let mut conf = Value::Object(Map::new());
        for uri in &self.uris {
            let (scheme, _) = split_scheme(uri);
            let provider = self
                .providers
                .get(scheme)
                .ok_or_else(|| ConfigError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    uri: uri.clone(),
                })?;

            debug!(uri = uri.as_str(), "Retrieving configuration source.");
            let (retrieved, guard) = provider
                .retrieve(uri, Some(notifier.clone()))
                .await?
                .into_parts();
            if let Some(guard) = guard {
                guards.push(guard);
            }
            merge(&mut conf, retrieved);
        }

        for converter in &self.converters {
            converter.convert(&mut conf)?;
        }

        self.guards = guards;
        Ok(conf)
    }

    /// Hands out the change stream. Only one watch is supported; later calls get a
    /// stream that is already closed.
    pub fn watch(&mut self) -> ConfigWatch {
        match self.watch.take() {
            Some(w) => w,
            None => {
                warn!("Config watch was already taken.");
                watch_channel().1
            }
        }
    }

    /// Stops all watches and shuts down the providers. The watch stream ends once
    /// the last notifier is gone.
    pub async fn shutdown(&mut self) -> Result<(), ConfigError> {
        self.guards.clear();
        self.notifier = None;

        let mut first_err = None;
        for provider in self.providers.values() {
            if let Err(e) = provider.shutdown().await {
                warn!(scheme = provider.scheme(), error = %e, "Config provider failed to shut down.");
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
