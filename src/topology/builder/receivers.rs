// SPDX-License-Identifier: Apache-2.0

use super::pipelines::Pipelines;
use super::{created, factory_not_found, settings_for, shutdown_components, start_components};
use crate::component::{
    BuildInfo, ComponentId, CreateSettings, Factories, Host, Kind, PipelineId, Receiver,
};
use crate::config::Config;
use crate::service::error::ServiceError;
use crate::topology::consumer::Consumer;
use crate::topology::fanout::{FanoutBuilder, SignalRouter};
use crate::topology::payload::Signal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

type Routes = BTreeMap<Signal, Vec<(PipelineId, Arc<dyn Consumer>)>>;

/// One instance per receiver ID. A receiver listed by several pipelines feeds all of
/// their heads, routed by the signal of each message.
pub(super) struct Receivers {
    receivers: Vec<(ComponentId, Arc<dyn Receiver>)>,
}

impl Receivers {
    pub(super) fn build(
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
        pipelines: &Pipelines,
    ) -> Result<Self, ServiceError> {
        let mut routes: BTreeMap<&ComponentId, Routes> = BTreeMap::new();
        for (pipeline_id, pipeline) in &config.service.pipelines {
            let head = pipelines
                .head(pipeline_id)
                .ok_or_else(|| ServiceError::NotConfigured {
                    kind: Kind::Processor,
                    id: pipeline_id.to_string(),
                })?;

            for id in &pipeline.receivers {
                let by_signal = routes
                    .entry(id)
                    .or_default()
                    .entry(pipeline_id.signal())
                    .or_default();
                if !by_signal.iter().any(|(pid, _)| pid == pipeline_id) {
                    by_signal.push((pipeline_id.clone(), head.clone()));
                }
            }
        }

        for id in config.receivers.keys().filter(|id| !routes.contains_key(id)) {
            info!(receiver = %id, "Receiver is not used by any pipeline, skipping.");
        }

        let mut receivers = Vec::with_capacity(routes.len());
        for (id, by_signal) in routes {
            let settings = settings_for(Kind::Receiver, id, &config.receivers)?;
            let factory = factories
                .receiver(id.type_name())
                .ok_or_else(|| factory_not_found(Kind::Receiver, id))?;

            let mut signal_routes = BTreeMap::new();
            for (signal, heads) in by_signal {
                let mut fanout = FanoutBuilder::new();
                for (_, head) in heads {
                    fanout = fanout.add_consumer(head);
                }
                let next = fanout.build().map_err(|e| ServiceError::Create {
                    kind: Kind::Receiver,
                    id: id.to_string(),
                    source: e.into(),
                })?;
                signal_routes.insert(signal, next);
            }
            let next: Arc<dyn Consumer> = Arc::new(SignalRouter::new(signal_routes));

            let receiver = created(
                Kind::Receiver,
                id,
                factory.create_receiver(
                    CreateSettings::new(id.clone(), build_info.clone()),
                    settings,
                    next,
                ),
            )?;
            receivers.push((id.clone(), receiver));
        }

        Ok(Self { receivers })
    }

    pub(super) async fn start(&self, host: &Arc<dyn Host>) -> Result<(), ServiceError> {
        start_components(Kind::Receiver, &self.receivers, host).await
    }

    pub(super) async fn shutdown(&self) -> Result<(), ServiceError> {
        shutdown_components(Kind::Receiver, &self.receivers).await
    }

    pub(super) fn len(&self) -> usize {
        self.receivers.len()
    }

    pub(super) fn ids(&self) -> Vec<ComponentId> {
        self.receivers.iter().map(|(id, _)| id.clone()).collect()
    }
}
