// SPDX-License-Identifier: Apache-2.0

use crate::component::{Kind, RegistryError};
use crate::config::ConfigError;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use tower::BoxError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to apply telemetry settings: {0}")]
    Telemetry(BoxError),

    #[error("{kind} {id:?} is not configured")]
    NotConfigured { kind: Kind, id: String },

    #[error("{kind} factory for type {type_name:?} is not configured")]
    FactoryNotFound { kind: Kind, type_name: String },

    #[error("failed to create {kind} {id:?}: {source}")]
    Create {
        kind: Kind,
        id: String,
        source: BoxError,
    },

    #[error("factory for {kind} {id:?} produced a nil {kind}")]
    NilComponent { kind: Kind, id: String },

    #[error("failed to start {kind} {id:?}: {source}")]
    Start {
        kind: Kind,
        id: String,
        source: BoxError,
    },

    #[error("failed to shut down {kind} {id:?}: {source}")]
    Shutdown {
        kind: Kind,
        id: String,
        source: BoxError,
    },

    #[error("failed to notify extension {id:?} that the pipelines are ready: {source}")]
    Ready { id: String, source: BoxError },

    #[error("failed to notify extension {id:?} that the pipelines are not ready: {source}")]
    NotReady { id: String, source: BoxError },

    #[error("fatal error reported by a component: {0}")]
    Fatal(BoxError),

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        source: Box<ServiceError>,
    },

    #[error("{0}")]
    Multiple(Errors),
}

impl ServiceError {
    pub fn stage(stage: &'static str, source: ServiceError) -> Self {
        ServiceError::Stage {
            stage,
            source: Box::new(source),
        }
    }
}

/// Collects the errors of a step that keeps going after a failure, such as
/// shutting down every component.
#[derive(Debug, Default)]
pub struct Errors(Vec<ServiceError>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: ServiceError) {
        match err {
            ServiceError::Multiple(inner) => self.0.extend(inner.0),
            e => self.0.push(e),
        }
    }

    pub fn capture(&mut self, res: Result<(), ServiceError>) {
        if let Err(e) = res {
            self.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceError> {
        self.0.iter()
    }

    pub fn into_result(mut self) -> Result<(), ServiceError> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(ServiceError::Multiple(self)),
        }
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "[{}]", joined.join("; "))
    }
}
