// SPDX-License-Identifier: Apache-2.0

pub mod factory;
pub mod host;
pub mod id;

pub use factory::{
    AnyFactory, ExporterFactory, ExtensionFactory, Factories, FactoriesBuilder, Factory,
    ProcessorFactory, ReceiverFactory, RegistryError,
};
pub use host::Host;
pub use id::{ComponentId, IdError, PipelineId};

use crate::topology::consumer::Consumer;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use tower::BoxError;

/// The four component categories the host knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Receiver,
    Processor,
    Exporter,
    Extension,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::Receiver, Kind::Processor, Kind::Exporter, Kind::Extension];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Receiver => "receiver",
            Kind::Processor => "processor",
            Kind::Exporter => "exporter",
            Kind::Extension => "extension",
        }
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle shared by every component. Both calls take `&self`: an exporter
/// referenced by several pipelines is a single shared instance.
#[async_trait]
pub trait Component: Send + Sync {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), BoxError>;

    async fn shutdown(&self) -> Result<(), BoxError>;
}

pub trait Receiver: Component {}

pub trait Processor: Component + Consumer {}

pub trait Exporter: Component + Consumer {}

pub trait Extension: Component {
    /// Extensions that care about pipeline readiness return themselves here.
    fn pipeline_watcher(&self) -> Option<&dyn PipelineWatcher> {
        None
    }
}

#[async_trait]
pub trait PipelineWatcher: Send + Sync {
    async fn ready(&self) -> Result<(), BoxError>;

    async fn not_ready(&self) -> Result<(), BoxError>;
}

/// Static identity of the running binary, handed to every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub command: String,
    pub description: String,
    pub version: String,
}

impl Default for BuildInfo {
    fn default() -> Self {
        Self {
            command: env!("CARGO_PKG_NAME").to_string(),
            description: env!("CARGO_PKG_DESCRIPTION").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateSettings {
    pub id: ComponentId,
    pub build_info: BuildInfo,
}

impl CreateSettings {
    pub fn new(id: ComponentId, build_info: BuildInfo) -> Self {
        Self { id, build_info }
    }
}
