// SPDX-License-Identifier: Apache-2.0

use crate::component::{Component, CreateSettings, Exporter, ExporterFactory, Factory, Host};
use crate::topology::consumer::Consumer;
use crate::topology::payload::Message;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tower::BoxError;
use tracing::debug;

pub const TYPE: &str = "blackhole";

#[derive(Debug, Default, Clone, Copy)]
pub struct BlackholeExporterFactory;

impl Factory for BlackholeExporterFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        Value::Object(Map::new())
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        match config.as_object() {
            Some(m) if m.is_empty() => Ok(()),
            _ => Err("blackhole exporter takes no settings".into()),
        }
    }
}

impl ExporterFactory for BlackholeExporterFactory {
    fn create_exporter(
        &self,
        _settings: CreateSettings,
        _config: &Value,
    ) -> Result<Option<Arc<dyn Exporter>>, BoxError> {
        Ok(Some(Arc::new(BlackholeExporter::default())))
    }
}

/// Drops everything it is given.
#[derive(Default)]
pub struct BlackholeExporter {
    items: AtomicU64,
}

impl BlackholeExporter {
    pub fn dropped_items(&self) -> u64 {
        self.items.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Consumer for BlackholeExporter {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        self.items
            .fetch_add(message.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl Component for BlackholeExporter {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), BoxError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        debug!(items = self.dropped_items(), "exiting blackhole exporter");
        Ok(())
    }
}

impl Exporter for BlackholeExporter {}
