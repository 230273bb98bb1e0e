// SPDX-License-Identifier: Apache-2.0

use super::{created, factory_not_found, settings_for, shutdown_components, start_components};
use crate::component::{
    BuildInfo, ComponentId, CreateSettings, Exporter, Factories, Host, Kind,
};
use crate::config::Config;
use crate::service::error::ServiceError;
use crate::topology::consumer::Consumer;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// One instance per exporter ID, shared by every pipeline that lists it.
pub(super) struct Exporters {
    exporters: Vec<(ComponentId, Arc<dyn Exporter>)>,
}

impl Exporters {
    pub(super) fn build(
        config: &Config,
        factories: &Factories,
        build_info: &BuildInfo,
    ) -> Result<Self, ServiceError> {
        let used: BTreeSet<&ComponentId> = config
            .service
            .pipelines
            .values()
            .flat_map(|p| p.exporters.iter())
            .collect();

        for id in config.exporters.keys().filter(|id| !used.contains(id)) {
            info!(exporter = %id, "Exporter is not used by any pipeline, skipping.");
        }

        let mut exporters = Vec::with_capacity(used.len());
        for id in used {
            let settings = settings_for(Kind::Exporter, id, &config.exporters)?;
            let factory = factories
                .exporter(id.type_name())
                .ok_or_else(|| factory_not_found(Kind::Exporter, id))?;

            let exporter = created(
                Kind::Exporter,
                id,
                factory.create_exporter(CreateSettings::new(id.clone(), build_info.clone()), settings),
            )?;
            exporters.push((id.clone(), exporter));
        }

        Ok(Self { exporters })
    }

    pub(super) async fn start(&self, host: &Arc<dyn Host>) -> Result<(), ServiceError> {
        start_components(Kind::Exporter, &self.exporters, host).await
    }

    pub(super) async fn shutdown(&self) -> Result<(), ServiceError> {
        shutdown_components(Kind::Exporter, &self.exporters).await
    }

    pub(super) fn consumer(&self, id: &ComponentId) -> Option<Arc<dyn Consumer>> {
        self.exporters
            .iter()
            .find(|(eid, _)| eid == id)
            .map(|(_, e)| Arc::new(e.clone()) as Arc<dyn Consumer>)
    }

    pub(super) fn len(&self) -> usize {
        self.exporters.len()
    }

    pub(super) fn ids(&self) -> Vec<ComponentId> {
        self.exporters.iter().map(|(id, _)| id.clone()).collect()
    }
}
