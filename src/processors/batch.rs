// SPDX-License-Identifier: Apache-2.0

use crate::component::{
    Component, ComponentId, CreateSettings, Factory, Host, Processor, ProcessorFactory,
};
use crate::init::wait;
use crate::topology::batch::{Batch, BatchConfig};
use crate::topology::consumer::Consumer;
use crate::topology::payload::{Message, Signal};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error};

pub const TYPE: &str = "batch";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchProcessorConfig {
    pub send_batch_size: usize,
    pub timeout_millis: u64,
}

impl Default for BatchProcessorConfig {
    fn default() -> Self {
        let defaults = BatchConfig::default();
        Self {
            send_batch_size: defaults.max_size,
            timeout_millis: defaults.timeout.as_millis() as u64,
        }
    }
}

impl BatchProcessorConfig {
    fn from_value(config: &Value) -> Result<BatchConfig, BoxError> {
        let cfg: Self = serde_json::from_value(config.clone())?;
        if cfg.send_batch_size == 0 {
            return Err("send_batch_size must be greater than zero".into());
        }
        if cfg.timeout_millis == 0 {
            return Err("timeout_millis must be greater than zero".into());
        }
        Ok(BatchConfig {
            max_size: cfg.send_batch_size,
            timeout: Duration::from_millis(cfg.timeout_millis),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchProcessorFactory;

impl Factory for BatchProcessorFactory {
    fn type_name(&self) -> &str {
        TYPE
    }

    fn default_config(&self) -> Value {
        serde_json::to_value(BatchProcessorConfig::default()).unwrap_or_default()
    }

    fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        BatchProcessorConfig::from_value(config).map(|_| ())
    }
}

impl ProcessorFactory for BatchProcessorFactory {
    fn create_processor(
        &self,
        settings: CreateSettings,
        config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Processor>>, BoxError> {
        let config = BatchProcessorConfig::from_value(config)?;
        Ok(Some(Arc::new(BatchProcessor::new(settings.id, config, next))))
    }
}

type Batches = Arc<Mutex<BTreeMap<Signal, Batch>>>;

/// Groups payload items per signal and forwards them once a batch fills up or
/// times out. Whatever is buffered at shutdown is flushed.
pub struct BatchProcessor {
    id: ComponentId,
    config: BatchConfig,
    next: Arc<dyn Consumer>,
    batches: Batches,
    cancel: CancellationToken,
    tasks: Mutex<JoinSet<Result<(), BoxError>>>,
}

impl BatchProcessor {
    pub fn new(id: ComponentId, config: BatchConfig, next: Arc<dyn Consumer>) -> Self {
        Self {
            id,
            config,
            next,
            batches: Arc::new(Mutex::new(BTreeMap::new())),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }
}

async fn flush(
    batches: &Batches,
    next: &Arc<dyn Consumer>,
    only_expired: bool,
) -> Result<(), BoxError> {
    let now = Instant::now();
    let ready: Vec<(Signal, Vec<_>)> = {
        let mut batches = batches.lock().await;
        batches
            .iter_mut()
            .filter(|(_, b)| if only_expired { b.should_flush(now) } else { !b.is_empty() })
            .map(|(signal, b)| (*signal, b.take_batch()))
            .collect()
    };

    let mut last_err = None;
    for (signal, items) in ready {
        debug!(signal = %signal, batch_size = items.len(), "Flushing a batch.");
        if let Err(e) = next.consume(Message::new(signal, items)).await {
            last_err = Some(e);
        }
    }
    match last_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait]
impl Consumer for BatchProcessor {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        let signal = message.signal;
        let full = {
            let mut batches = self.batches.lock().await;
            batches
                .entry(signal)
                .or_insert_with(|| Batch::new(&self.config))
                .offer(message.payload)
        };

        for items in full {
            self.next.consume(Message::new(signal, items)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Component for BatchProcessor {
    async fn start(&self, _host: Arc<dyn Host>) -> Result<(), BoxError> {
        let batches = self.batches.clone();
        let next = self.next.clone();
        let cancel = self.cancel.clone();
        let id = self.id.clone();
        let mut batch_timer = tokio::time::interval(self.config.timeout);

        self.tasks.lock().await.spawn(async move {
            loop {
                select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    // flush batches as they time out
                    _ = batch_timer.tick() => {
                        if let Err(e) = flush(&batches, &next, true).await {
                            error!(component_id = %id, error = %e, "Unable to send timed out batch, dropping it.");
                        }
                    }
                }
            }
            Ok(())
        });
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.cancel.cancel();
        {
            let mut tasks = self.tasks.lock().await;
            wait::wait_for_tasks_with_timeout(&mut tasks, SHUTDOWN_TIMEOUT).await?;
        }
        flush(&self.batches, &self.next, false).await
    }
}

impl Processor for BatchProcessor {}
