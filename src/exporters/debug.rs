// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    Component, ComponentId, CreateSettings, Exporter, ExporterFactory, Factory, Host,
};
use crate::topology::consumer::Consumer;
use crate::topology::payload::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tower::BoxError;
use tracing::{Level, event};

pub const TYPE: &str = "debug";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// One line per message
    #[default]
    Basic,
    /// One extra line per payload item
    Detailed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugExporterConfig {
    pub verbosity: Verbosity,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DebugExporterFactory;

impl Factory for DebugExporterFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(DebugExporterConfig::default()).unwrap_or_default()
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        serde_json::from_value::<DebugExporterConfig>(config.clone())?;
        Ok(())
    }
}

impl ExporterFactory for DebugExporterFactory {
    fn create_exporter(
        &self,
        settings: CreateSettings,
        config: &Value,
    ) -> Result<Option<Arc<dyn Exporter>>, BoxError> {
        let config: DebugExporterConfig = serde_json::from_value(config.clone())?;
        Ok(Some(Arc::new(DebugExporter {
            id: settings.id,
            verbosity: config.verbosity,
        })))
    }
}

/// Logs what flows through a pipeline instead of sending it anywhere.
pub struct DebugExporter {
    id: ComponentId,
    verbosity: Verbosity,
}

#[async_trait]
impl Consumer for DebugExporter {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        event!(
            Level::INFO,
            component_id = %self.id,
            data_type = message.signal.as_str(),
            items = message.len(),
            bytes = message.byte_size(),
            "Received {}.",
            message.signal
        );

        if self.verbosity == Verbosity::Detailed {
            for (i, item) in message.payload.iter().enumerate() {
                event!(
                    Level::INFO,
                    component_id = %self.id,
                    data_type = message.signal.as_str(),
                    index = i,
                    bytes = item.len(),
                    "Payload item."
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Component for DebugExporter {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), BoxError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl Exporter for DebugExporter {}
