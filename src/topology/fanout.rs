// SPDX-License-Identifier: Apache-2.0

use crate::topology::consumer::Consumer;
use crate::topology::payload::{Message, Signal};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::BoxError;

/// Distributes each message to every downstream consumer in order.
///
/// The message is cloned for all consumers except the last one to avoid unnecessary cloning.
/// A failing consumer does not stop delivery to the remaining ones; all failures are
/// reported together.
pub struct Fanout {
    consumers: Vec<Arc<dyn Consumer>>,
}

/// Builder for constructing a fanout node.
///
/// When only a single consumer was added the builder hands it back directly, so a pipeline
/// with a single exporter pays no extra indirection.
#[derive(Default)]
pub struct FanoutBuilder {
    consumers: Vec<Arc<dyn Consumer>>,
}

impl Fanout {
    pub fn new(consumers: Vec<Arc<dyn Consumer>>) -> Self {
        Self { consumers }
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

#[async_trait]
impl Consumer for Fanout {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        let mut failures = Vec::new();

        if let Some((last, rest)) = self.consumers.split_last() {
            for (idx, consumer) in rest.iter().enumerate() {
                if let Err(e) = consumer.consume(message.clone()).await {
                    failures.push(format!("consumer {}: {}", idx, e));
                }
            }
            if let Err(e) = last.consume(message).await {
                failures.push(format!("consumer {}: {}", rest.len(), e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(format!("fanout delivery failed: [{}]", failures.join("; ")).into())
        }
    }
}

impl FanoutBuilder {
    pub fn new() -> Self {
        Self {
            consumers: Vec::new(),
        }
    }

    pub fn add_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn build(mut self) -> Result<Arc<dyn Consumer>, FanoutBuilderError> {
        match self.consumers.len() {
            0 => Err(FanoutBuilderError::NoConsumers),
            1 => Ok(self.consumers.remove(0)),
            _ => Ok(Arc::new(Fanout::new(self.consumers))),
        }
    }
}

/// Error type for fanout builder operations
#[derive(Debug, PartialEq, Eq)]
pub enum FanoutBuilderError {
    /// No consumers were added to the builder
    NoConsumers,
}

impl std::fmt::Display for FanoutBuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FanoutBuilderError::NoConsumers => {
                write!(f, "At least one consumer must be added to the fanout")
            }
        }
    }
}

impl std::error::Error for FanoutBuilderError {}

/// Sits behind a receiver and forwards each message to the pipelines that carry its
/// signal. A receiver listed in several pipelines of different signals gets one router.
pub struct SignalRouter {
    routes: BTreeMap<Signal, Arc<dyn Consumer>>,
}

impl SignalRouter {
    pub fn new(routes: BTreeMap<Signal, Arc<dyn Consumer>>) -> Self {
        Self { routes }
    }

    pub fn accepts(&self, signal: Signal) -> bool {
        self.routes.contains_key(&signal)
    }
}

#[async_trait]
impl Consumer for SignalRouter {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        match self.routes.get(&message.signal) {
            Some(next) => next.consume(message).await,
            None => Err(format!("no pipeline accepts {} data", message.signal).into()),
        }
    }
}
