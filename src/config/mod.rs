// SPDX-License-Identifier: Apache-2.0

mod error;

pub use error::ConfigError;

use crate::component::{ComponentId, Factories, Kind, PipelineId};
use crate::confmap::merge;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;

const RECEIVERS_KEY: &str = "receivers";
const PROCESSORS_KEY: &str = "processors";
const EXPORTERS_KEY: &str = "exporters";
const EXTENSIONS_KEY: &str = "extensions";
const SERVICE_KEY: &str = "service";

/// Fully resolved service configuration. Component settings are stored as the
/// factory's defaults with user settings merged over them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Config {
    pub receivers: BTreeMap<ComponentId, Value>,
    pub processors: BTreeMap<ComponentId, Value>,
    pub exporters: BTreeMap<ComponentId, Value>,
    pub extensions: BTreeMap<ComponentId, Value>,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub extensions: Vec<ComponentId>,
    pub pipelines: BTreeMap<PipelineId, PipelineConfig>,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub receivers: Vec<ComponentId>,
    pub processors: Vec<ComponentId>,
    pub exporters: Vec<ComponentId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    pub level: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LogsConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        LevelFilter::from_str(&self.level).map_err(|_| {
            ConfigError::Invalid(format!(
                "service::telemetry::logs::level: unknown level {:?}",
                self.level
            ))
        })
    }
}

impl Config {
    /// Decodes a resolved configuration map, merging each component's settings over
    /// the defaults of the factory registered for its type.
    pub fn unmarshal(raw: Value, factories: &Factories) -> Result<Config, ConfigError> {
        let mut root = match raw {
            Value::Null => Map::new(),
            Value::Object(m) => m,
            other => {
                return Err(ConfigError::Unmarshal(format!(
                    "expected a map at the top level, found {}",
                    value_kind(&other)
                )));
            }
        };

        if let Some(unknown) = root.keys().find(|k| {
            ![
                RECEIVERS_KEY,
                PROCESSORS_KEY,
                EXPORTERS_KEY,
                EXTENSIONS_KEY,
                SERVICE_KEY,
            ]
            .contains(&k.as_str())
        }) {
            return Err(ConfigError::Unmarshal(format!(
                "unknown top-level key {:?}",
                unknown
            )));
        }

        let receivers = unmarshal_section(Kind::Receiver, root.remove(RECEIVERS_KEY), factories)?;
        let processors =
            unmarshal_section(Kind::Processor, root.remove(PROCESSORS_KEY), factories)?;
        let exporters = unmarshal_section(Kind::Exporter, root.remove(EXPORTERS_KEY), factories)?;
        let extensions =
            unmarshal_section(Kind::Extension, root.remove(EXTENSIONS_KEY), factories)?;

        let service = match root.remove(SERVICE_KEY) {
            None | Some(Value::Null) => ServiceConfig::default(),
            Some(v) => serde_json::from_value(v)
                .map_err(|e| ConfigError::Unmarshal(format!("{}: {}", SERVICE_KEY, e)))?,
        };

        Ok(Config {
            receivers,
            processors,
            exporters,
            extensions,
            service,
        })
    }

    /// Checks the cross references between the service section and the component maps.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for ext in &self.service.extensions {
            if !self.extensions.contains_key(ext) {
                return Err(invalid(format!(
                    "service references extension {:?} which does not exist",
                    ext.to_string()
                )));
            }
            if !seen.insert(ext) {
                return Err(invalid(format!(
                    "extension {:?} is listed multiple times",
                    ext.to_string()
                )));
            }
        }

        if self.service.pipelines.is_empty() {
            return Err(invalid("service must define at least one pipeline".to_string()));
        }

        for (pipeline_id, pipeline) in &self.service.pipelines {
            let pid = pipeline_id.to_string();

            if pipeline.receivers.is_empty() {
                return Err(invalid(format!(
                    "pipeline {:?} must have at least one receiver",
                    pid
                )));
            }
            check_refs(&pid, Kind::Receiver, &pipeline.receivers, &self.receivers)?;

            check_refs(&pid, Kind::Processor, &pipeline.processors, &self.processors)?;
            let mut seen = BTreeSet::new();
            for proc in &pipeline.processors {
                if !seen.insert(proc) {
                    return Err(invalid(format!(
                        "pipeline {:?} references processor {:?} multiple times",
                        pid,
                        proc.to_string()
                    )));
                }
            }

            if pipeline.exporters.is_empty() {
                return Err(invalid(format!(
                    "pipeline {:?} must have at least one exporter",
                    pid
                )));
            }
            check_refs(&pid, Kind::Exporter, &pipeline.exporters, &self.exporters)?;
        }

        self.service.telemetry.logs.level_filter()?;

        Ok(())
    }

    /// True when the extension set would have to be rebuilt to move from `self` to `other`.
    pub fn extensions_changed(&self, other: &Config) -> bool {
        self.service.extensions != other.service.extensions || self.extensions != other.extensions
    }
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}

fn check_refs(
    pipeline: &str,
    kind: Kind,
    refs: &[ComponentId],
    defined: &BTreeMap<ComponentId, Value>,
) -> Result<(), ConfigError> {
    match refs.iter().find(|id| !defined.contains_key(id)) {
        Some(missing) => Err(invalid(format!(
            "pipeline {:?} references {} {:?} which does not exist",
            pipeline,
            kind,
            missing.to_string()
        ))),
        None => Ok(()),
    }
}

fn unmarshal_section(
    kind: Kind,
    section: Option<Value>,
    factories: &Factories,
) -> Result<BTreeMap<ComponentId, Value>, ConfigError> {
    let section = match section {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(m)) => m,
        Some(other) => {
            return Err(ConfigError::Unmarshal(format!(
                "{}s: expected a map, found {}",
                kind,
                value_kind(&other)
            )));
        }
    };

    let mut out = BTreeMap::new();
    for (key, settings) in section {
        let id: ComponentId = key
            .parse()
            .map_err(|e| ConfigError::Unmarshal(format!("{}s: {}", kind, e)))?;

        let factory = factories.lookup(kind, id.type_name()).ok_or_else(|| {
            ConfigError::Unmarshal(format!(
                "{} factory for type {:?} is not configured (used by {:?})",
                kind,
                id.type_name(),
                id.to_string()
            ))
        })?;

        let mut merged = factory.default_config();
        match settings {
            Value::Null => {}
            Value::Object(_) => merge(&mut merged, settings),
            other => {
                return Err(ConfigError::Unmarshal(format!(
                    "{} {:?}: expected a map of settings, found {}",
                    kind,
                    id.to_string(),
                    value_kind(&other)
                )));
            }
        }

        factory
            .validate_config(&merged)
            .map_err(|e| invalid(format!("{} {:?}: {}", kind, id.to_string(), e)))?;

        out.insert(id, merged);
    }

    Ok(out)
}

fn value_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}
