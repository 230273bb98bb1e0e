// SPDX-License-Identifier: Apache-2.0

use crate::topology::payload::Signal;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

const NAME_SEPARATOR: char = '/';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid id {id:?}: {reason}")]
pub struct IdError {
    id: String,
    reason: &'static str,
}

impl IdError {
    fn new(id: &str, reason: &'static str) -> Self {
        Self {
            id: id.to_string(),
            reason,
        }
    }
}

/// Identifies a configured component as `type[/name]`. The type selects the factory,
/// the optional name distinguishes several instances of the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    type_name: String,
    name: Option<String>,
}

impl ComponentId {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: None,
        }
    }

    pub fn with_name(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: Some(name.into()),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

fn split_id(s: &str) -> Result<(&str, Option<&str>), IdError> {
    if s.chars().any(char::is_whitespace) {
        return Err(IdError::new(s, "must not contain whitespace"));
    }

    let (type_name, name) = match s.split_once(NAME_SEPARATOR) {
        Some((t, n)) => (t, Some(n)),
        None => (s, None),
    };

    if type_name.is_empty() {
        return Err(IdError::new(s, "type must not be empty"));
    }
    if let Some(n) = name {
        if n.is_empty() {
            return Err(IdError::new(s, "name must not be empty when '/' is present"));
        }
    }

    Ok((type_name, name))
}

impl FromStr for ComponentId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_name, name) = split_id(s)?;
        Ok(Self {
            type_name: type_name.to_string(),
            name: name.map(|n| n.to_string()),
        })
    }
}

impl Display for ComponentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.type_name),
            Some(name) => write!(f, "{}{}{}", self.type_name, NAME_SEPARATOR, name),
        }
    }
}

/// Pipelines are keyed like components, with the signal in place of the type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId {
    signal: Signal,
    name: Option<String>,
}

impl PipelineId {
    pub fn new(signal: Signal) -> Self {
        Self { signal, name: None }
    }

    pub fn with_name(signal: Signal, name: impl Into<String>) -> Self {
        Self {
            signal,
            name: Some(name.into()),
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl FromStr for PipelineId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (signal, name) = split_id(s)?;
        let signal = signal
            .parse::<Signal>()
            .map_err(|_| IdError::new(s, "pipeline type must be one of traces, metrics or logs"))?;
        Ok(Self {
            signal,
            name: name.map(|n| n.to_string()),
        })
    }
}

impl Display for PipelineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.signal),
            Some(name) => write!(f, "{}{}{}", self.signal, NAME_SEPARATOR, name),
        }
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

string_serde!(ComponentId);
string_serde!(PipelineId);
