// SPDX-License-Identifier: Apache-2.0

//! Turns the service section of a [`Config`] into running components. Exporters are
//! built first so that processors can be chained in front of them, and receivers last,
//! once every pipeline head exists. Shutdown runs in the opposite direction.

mod exporters;
mod pipelines;
mod receivers;

use crate::component::{BuildInfo, Component, ComponentId, Factories, Host, Kind, PipelineId};
use crate::config::Config;
use crate::service::error::{Errors, ServiceError};
use exporters::Exporters;
use pipelines::Pipelines;
use receivers::Receivers;
use std::sync::Arc;
use tracing::{info, warn};

/// A built and started component graph.
pub struct Topology {
    exporters: Exporters,
    pipelines: Pipelines,
    receivers: Receivers,
}

impl Topology {
    pub async fn build_and_start(
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
        host: Arc<dyn Host>,
    ) -> Result<Self, ServiceError> {
        let exporters = Exporters::build(config, factories, build_info)
            .map_err(|e| ServiceError::stage("cannot build exporters", e))?;
        info!(count = exporters.len(), "Starting exporters.");
        exporters
            .start(&host)
            .await
            .map_err(|e| ServiceError::stage("cannot start exporters", e))?;

        let pipelines = match Pipelines::build(config, factories, build_info, &exporters) {
            Ok(p) => p,
            Err(e) => {
                rollback(exporters.shutdown().await);
                return Err(ServiceError::stage("cannot build pipelines", e));
            }
        };
        info!(count = pipelines.processor_count(), "Starting processors.");
        if let Err(e) = pipelines.start(&host).await {
            rollback(exporters.shutdown().await);
            return Err(ServiceError::stage("cannot start processors", e));
        }

        let receivers = match Receivers::build(config, factories, build_info, &pipelines) {
            Ok(r) => r,
            Err(e) => {
                rollback(pipelines.shutdown().await);
                rollback(exporters.shutdown().await);
                return Err(ServiceError::stage("cannot build receivers", e));
            }
        };
        info!(count = receivers.len(), "Starting receivers.");
        if let Err(e) = receivers.start(&host).await {
            rollback(pipelines.shutdown().await);
            rollback(exporters.shutdown().await);
            return Err(ServiceError::stage("cannot start receivers", e));
        }

        Ok(Self {
            exporters,
            pipelines,
            receivers,
        })
    }

    /// Stops receivers, then processors (head to tail), then exporters. Every
    /// component is asked to stop even when an earlier one failed.
    pub async fn shutdown(self) -> Result<(), ServiceError> {
        let mut errs = Errors::new();

        info!("Stopping receivers.");
        errs.capture(
            self.receivers
                .shutdown()
                .await
                .map_err(|e| ServiceError::stage("failed to shut down receivers", e)),
        );

        info!("Stopping processors.");
        errs.capture(
            self.pipelines
                .shutdown()
                .await
                .map_err(|e| ServiceError::stage("failed to shut down processors", e)),
        );

        info!("Stopping exporters.");
        errs.capture(
            self.exporters
                .shutdown()
                .await
                .map_err(|e| ServiceError::stage("failed to shut down exporters", e)),
        );

        errs.into_result()
    }

    pub fn receiver_ids(&self) -> Vec<ComponentId> {
        self.receivers.ids()
    }

    pub fn exporter_ids(&self) -> Vec<ComponentId> {
        self.exporters.ids()
    }

    pub fn pipeline_ids(&self) -> Vec<PipelineId> {
        self.pipelines.ids()
    }
}

fn rollback(res: Result<(), ServiceError>) {
    if let Err(e) = res {
        warn!(error = %e, "Error while stopping partially started components.");
    }
}

/// Starts components in order. When one fails, those already started are stopped
/// again in reverse order before the error is returned.
pub(crate) async fn start_components<C>(
    kind: Kind,
    components: &[(ComponentId, Arc<C>)],
    host: &Arc<dyn Host>,
) -> Result<(), ServiceError>
where
    C: Component + ?Sized,
{
    for (idx, (id, component)) in components.iter().enumerate() {
        info!(kind = %kind, id = %id, "Component is starting.");
        if let Err(e) = component.start(host.clone()).await {
            let started: Vec<(ComponentId, Arc<C>)> =
                components[..idx].iter().rev().cloned().collect();
            rollback(shutdown_components(kind, &started).await);

            return Err(ServiceError::Start {
                kind,
                id: id.to_string(),
                source: e,
            });
        }
    }
    Ok(())
}

/// Stops components in the given order, collecting every failure.
pub(crate) async fn shutdown_components<C>(
    kind: Kind,
    components: &[(ComponentId, Arc<C>)],
) -> Result<(), ServiceError>
where
    C: Component + ?Sized,
{
    let mut errs = Errors::new();
    for (id, component) in components {
        info!(kind = %kind, id = %id, "Component is shutting down.");
        if let Err(e) = component.shutdown().await {
            errs.push(ServiceError::Shutdown {
                kind,
                id: id.to_string(),
                source: e,
            });
        }
    }
    errs.into_result()
}

/// Looks up the settings of `id`, failing when the component is not in the config.
pub(crate) fn settings_for<'a>(
    kind: Kind,
    id: &ComponentId,
    section: &'a std::collections::BTreeMap<ComponentId, serde_json::Value>,
) -> Result<&'a serde_json::Value, ServiceError> {
    section.get(id).ok_or_else(|| ServiceError::NotConfigured {
        kind,
        id: id.to_string(),
    })
}

/// Maps the outcome of a factory call onto the builder's error types.
pub(crate) fn created<T: ?Sized>(
    kind: Kind,
    id: &ComponentId,
    res: Result<Option<Arc<T>>, tower::BoxError>,
) -> Result<Arc<T>, ServiceError> {
    match res {
        Ok(Some(c)) => Ok(c),
        Ok(None) => Err(ServiceError::NilComponent {
            kind,
            id: id.to_string(),
        }),
        Err(e) => Err(ServiceError::Create {
            kind,
            id: id.to_string(),
            source: e,
        }),
    }
}

pub(crate) fn factory_not_found(kind: Kind, id: &ComponentId) -> ServiceError {
    ServiceError::FactoryNotFound {
        kind,
        type_name: id.type_name().to_string(),
    }
}
