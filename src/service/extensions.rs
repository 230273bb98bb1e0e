// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    BuildInfo, ComponentId, CreateSettings, Extension, Factories, Host, Kind,
};
use crate::config::Config;
use crate::service::error::{Errors, ServiceError};
use std::sync::Arc;
use tracing::{info, warn};

/// The running extensions, in the order the service section lists them.
#[derive(Default)]
pub struct Extensions {
    extensions: Vec<(ComponentId, Arc<dyn Extension>)>,
}

impl Extensions {
    /// Builds and starts each configured extension in turn. If one fails, the ones
    /// already started are shut down again before the error is returned.
    pub async fn build_and_start(
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
        host: Arc<dyn Host>,
    ) -> Result<Self, ServiceError> {
        let mut exts = Self::default();

        for id in &config.service.extensions {
            if let Err(e) = exts.build_one(id, config, factories, build_info, &host).await {
                if let Err(stop_err) = exts.shutdown().await {
                    warn!(error = %stop_err, "Error while stopping partially started extensions.");
                }
                return Err(e);
            }
        }

        Ok(exts)
    }

    async fn build_one(
        &mut self,
        id: &ComponentId,
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
        host: &Arc<dyn Host>,
    ) -> Result<(), ServiceError> {
        let settings = config
            .extensions
            .get(id)
            .ok_or_else(|| ServiceError::NotConfigured {
                kind: Kind::Extension,
                id: id.to_string(),
            })?;
        let factory =
            factories
                .extension(id.type_name())
                .ok_or_else(|| ServiceError::FactoryNotFound {
                    kind: Kind::Extension,
                    type_name: id.type_name().to_string(),
                })?;

        let ext = match factory
            .create_extension(CreateSettings::new(id.clone(), build_info.clone()), settings)
        {
            Ok(Some(ext)) => ext,
            Ok(None) => {
                return Err(ServiceError::NilComponent {
                    kind: Kind::Extension,
                    id: id.to_string(),
                });
            }
            Err(e) => {
                return Err(ServiceError::Create {
                    kind: Kind::Extension,
                    id: id.to_string(),
                    source: e,
                });
            }
        };

        info!(extension = %id, "Extension is starting.");
        ext.start(host.clone())
            .await
            .map_err(|e| ServiceError::Start {
                kind: Kind::Extension,
                id: id.to_string(),
                source: e,
            })?;
        info!(extension = %id, "Extension started.");

        self.extensions.push((id.clone(), ext));
        Ok(())
    }

    /// Tells pipeline watchers, in order, that pipelines are running. Stops at the
    /// first failure.
    pub async fn notify_pipeline_ready(&self) -> Result<(), ServiceError> {
        for (id, ext) in &self.extensions {
            if let Some(watcher) = ext.pipeline_watcher() {
                watcher.ready().await.map_err(|e| ServiceError::Ready {
                    id: id.to_string(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    /// Tells pipeline watchers, in reverse order, that pipelines are going away. Every
    /// watcher is notified even if an earlier one fails.
    pub async fn notify_pipeline_not_ready(&self) -> Result<(), ServiceError> {
        let mut errs = Errors::new();
        for (id, ext) in self.extensions.iter().rev() {
            if let Some(watcher) = ext.pipeline_watcher() {
                if let Err(e) = watcher.not_ready().await {
                    errs.push(ServiceError::NotReady {
                        id: id.to_string(),
                        source: e,
                    });
                }
            }
        }
        errs.into_result()
    }

    /// Stops every extension in reverse order and forgets them.
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        let mut errs = Errors::new();
        while let Some((id, ext)) = self.extensions.pop() {
            info!(extension = %id, "Extension is shutting down.");
            if let Err(e) = ext.shutdown().await {
                errs.push(ServiceError::Shutdown {
                    kind: Kind::Extension,
                    id: id.to_string(),
                    source: e,
                });
            }
        }
        errs.into_result()
    }

    pub fn ids(&self) -> Vec<ComponentId> {
        self.extensions.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}
