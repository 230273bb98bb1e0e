// SPDX-License-Identifier: Apache-2.0

use super::exporters::Exporters;
use super::{
    created, factory_not_found, rollback, settings_for, shutdown_components, start_components,
};
use crate::component::{
    BuildInfo, ComponentId, CreateSettings, Factories, Host, Kind, PipelineId, Processor,
};
use crate::config::Config;
use crate::service::error::{Errors, ServiceError};
use crate::topology::consumer::Consumer;
use crate::topology::fanout::FanoutBuilder;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

struct Chain {
    // Ordered head to tail, as listed in the config
    processors: Vec<(ComponentId, Arc<dyn Processor>)>,
    head: Arc<dyn Consumer>,
}

/// Processor chains, one per pipeline. Processors are never shared between
/// pipelines, even when two pipelines list the same ID.
pub(super) struct Pipelines {
    chains: BTreeMap<PipelineId, Chain>,
}

impl Pipelines {
    pub(super) fn build(
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
        exporters: &Exporters,
    ) -> Result<Self, ServiceError> {
        let mut chains = BTreeMap::new();

        for (pipeline_id, pipeline) in &config.service.pipelines {
            let mut fanout = FanoutBuilder::new();
            for id in &pipeline.exporters {
                let exporter = exporters.consumer(id).ok_or_else(|| {
                    ServiceError::NotConfigured {
                        kind: Kind::Exporter,
                        id: id.to_string(),
                    }
                })?;
                fanout = fanout.add_consumer(exporter);
            }
            let mut next = fanout.build().map_err(|e| ServiceError::Create {
                kind: Kind::Exporter,
                id: pipeline_id.to_string(),
                source: e.into(),
            })?;

            // Built tail first, each processor wrapping the one after it
            let mut processors = Vec::with_capacity(pipeline.processors.len());
            for id in pipeline.processors.iter().rev() {
                let settings = settings_for(Kind::Processor, id, &config.processors)?;
                let factory = factories
                    .processor(id.type_name())
                    .ok_or_else(|| factory_not_found(Kind::Processor, id))?;

                debug!(pipeline = %pipeline_id, processor = %id, "Building processor.");
                let processor = created(
                    Kind::Processor,
                    id,
                    factory.create_processor(
                        CreateSettings::new(id.clone(), build_info.clone()),
                        settings,
                        next.clone(),
                    ),
                )?;

                next = Arc::new(processor.clone());
                processors.push((id.clone(), processor));
            }
            processors.reverse();

            chains.insert(
                pipeline_id.clone(),
                Chain {
                    processors,
                    head: next,
                },
            );
        }

        Ok(Self { chains })
    }

    /// Starts each chain from its tail, so no processor receives data before the
    /// ones behind it are running.
    pub(super) async fn start(&self, host: &Arc<dyn Host>) -> Result<(), ServiceError> {
        let mut started: Vec<&Chain> = Vec::new();
        for chain in self.chains.values() {
            let tail_first: Vec<_> = chain.processors.iter().rev().cloned().collect();
            if let Err(e) = start_components(Kind::Processor, &tail_first, host).await {
                for done in started.iter().rev() {
                    rollback(shutdown_components(Kind::Processor, &done.processors).await);
                }
                return Err(e);
            }
            started.push(chain);
        }
        Ok(())
    }

    /// Stops each chain from its head.
    pub(super) async fn shutdown(&self) -> Result<(), ServiceError> {
        let mut errs = Errors::new();
        for chain in self.chains.values() {
            errs.capture(shutdown_components(Kind::Processor, &chain.processors).await);
        }
        errs.into_result()
    }

    pub(super) fn head(&self, id: &PipelineId) -> Option<Arc<dyn Consumer>> {
        self.chains.get(id).map(|c| c.head.clone())
    }

    pub(super) fn processor_count(&self) -> usize {
        self.chains.values().map(|c| c.processors.len()).sum()
    }

    pub(super) fn ids(&self) -> Vec<PipelineId> {
        self.chains.keys().cloned().collect()
    }
}
