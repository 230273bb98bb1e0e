// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;
use tower::BoxError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one config URI must be provided")]
    NoUris,

    #[error("unsupported scheme {scheme:?} in {uri:?}")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("cannot retrieve the configuration from {uri:?}: {source}")]
    Retrieve { uri: String, source: BoxError },

    #[error("cannot parse the configuration from {uri:?}: {source}")]
    Parse {
        uri: String,
        source: Box<figment::Error>,
    },

    #[error("cannot convert the configuration: {0}")]
    Convert(BoxError),

    #[error("cannot watch the configuration: {0}")]
    Watch(String),

    #[error("cannot resolve the configuration: {0}")]
    Resolve(#[source] Box<ConfigError>),

    #[error("cannot unmarshal the configuration: {0}")]
    Unmarshal(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("config resolver is shut down")]
    Shutdown,
}

impl ConfigError {
    pub(crate) fn resolve(err: ConfigError) -> Self {
        match err {
            e @ ConfigError::Resolve(_) => e,
            e => ConfigError::Resolve(Box::new(e)),
        }
    }
}
