// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The telemetry signal a pipeline carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSignal(pub String);

impl Display for UnknownSignal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "unknown signal: {}", self.0)
    }
}

impl std::error::Error for UnknownSignal {}

impl FromStr for Signal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traces" => Ok(Signal::Traces),
            "metrics" => Ok(Signal::Metrics),
            "logs" => Ok(Signal::Logs),
            _ => Err(UnknownSignal(s.to_string())),
        }
    }
}

/// Unit of data moving through a pipeline. Payload items are opaque encoded
/// telemetry; nothing in the host looks inside them.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub signal: Signal,
    pub payload: Vec<Bytes>,
}

impl Message {
    pub fn new(signal: Signal, payload: Vec<Bytes>) -> Self {
        Self { signal, payload }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn byte_size(&self) -> usize {
        self.payload.iter().map(|b| b.len()).sum()
    }
}
