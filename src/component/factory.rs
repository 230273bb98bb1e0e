// SPDX-License-Identifier: Apache-2.0

use crate::component::{CreateSettings, Exporter, Extension, Kind, Processor, Receiver};
use crate::topology::consumer::Consumer;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tower::BoxError;

/// Common surface of every factory. `default_config` must return a non-null value;
/// user settings are merged over it before a component is created.
pub trait Factory: Send + Sync {
    fn type_name(&self) -> &str;

    fn default_config(&self) -> Value;

    fn validate_config(&self, _config: &Value) -> Result<(), BoxError> {
        Ok(())
    }
}

// The create methods return Ok(None) when the factory produced nothing, which the
// builders treat as an error naming the component.

pub trait ReceiverFactory: Factory {
    fn create_receiver(
        &self,
        settings: CreateSettings,
        config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Receiver>>, BoxError>;
}

pub trait ProcessorFactory: Factory {
    fn create_processor(
        &self,
        settings: CreateSettings,
        config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Processor>>, BoxError>;
}

pub trait ExporterFactory: Factory {
    fn create_exporter(
        &self,
        settings: CreateSettings,
        config: &Value,
    ) -> Result<Option<Arc<dyn Exporter>>, BoxError>;
}

pub trait ExtensionFactory: Factory {
    fn create_extension(
        &self,
        settings: CreateSettings,
        config: &Value,
    ) -> Result<Option<Arc<dyn Extension>>, BoxError>;
}

macro_rules! dispatch {
    ($self:ident, $f:ident => $call:expr) => {
        match $self {
            AnyFactory::Receiver($f) => $call,
            AnyFactory::Processor($f) => $call,
            AnyFactory::Exporter($f) => $call,
            AnyFactory::Extension($f) => $call,
        }
    };
}

#[derive(Clone)]
pub enum AnyFactory {
    Receiver(Arc<dyn ReceiverFactory>),
    Processor(Arc<dyn ProcessorFactory>),
    Exporter(Arc<dyn ExporterFactory>),
    Extension(Arc<dyn ExtensionFactory>),
}

impl AnyFactory {
    pub fn kind(&self) -> Kind {
        match self {
            AnyFactory::Receiver(_) => Kind::Receiver,
            AnyFactory::Processor(_) => Kind::Processor,
            AnyFactory::Exporter(_) => Kind::Exporter,
            AnyFactory::Extension(_) => Kind::Extension,
        }
    }

    pub fn type_name(&self) -> &str {
        dispatch!(self, f => f.type_name())
    }

    pub fn default_config(&self) -> Value {
        dispatch!(self, f => f.default_config())
    }

    pub fn validate_config(&self, config: &Value) -> Result<(), BoxError> {
        dispatch!(self, f => f.validate_config(config))
    }
}

impl std::fmt::Debug for AnyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyFactory")
            .field("kind", &self.kind())
            .field("type", &self.type_name())
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{kind} factory type must not be empty")]
    EmptyTypeName { kind: Kind },

    #[error("duplicate {kind} factory {type_name:?}")]
    Duplicate { kind: Kind, type_name: String },

    #[error("{kind} factory {type_name:?} has a nil default config")]
    NilDefaultConfig { kind: Kind, type_name: String },
}

/// The read-only registry of component factories, keyed by kind and type.
#[derive(Clone, Default)]
pub struct Factories {
    by_kind: BTreeMap<Kind, BTreeMap<String, AnyFactory>>,
}

impl Factories {
    pub fn builder() -> FactoriesBuilder {
        FactoriesBuilder::default()
    }

    pub fn lookup(&self, kind: Kind, type_name: &str) -> Option<&AnyFactory> {
        self.by_kind.get(&kind).and_then(|m| m.get(type_name))
    }

    pub fn of_kind(&self, kind: Kind) -> BTreeMap<String, AnyFactory> {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    pub fn receiver(&self, type_name: &str) -> Option<Arc<dyn ReceiverFactory>> {
        match self.lookup(Kind::Receiver, type_name) {
            Some(AnyFactory::Receiver(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn processor(&self, type_name: &str) -> Option<Arc<dyn ProcessorFactory>> {
        match self.lookup(Kind::Processor, type_name) {
            Some(AnyFactory::Processor(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn exporter(&self, type_name: &str) -> Option<Arc<dyn ExporterFactory>> {
        match self.lookup(Kind::Exporter, type_name) {
            Some(AnyFactory::Exporter(f)) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn extension(&self, type_name: &str) -> Option<Arc<dyn ExtensionFactory>> {
        match self.lookup(Kind::Extension, type_name) {
            Some(AnyFactory::Extension(f)) => Some(f.clone()),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct FactoriesBuilder {
    factories: Factories,
}

impl FactoriesBuilder {
    pub fn register(mut self, factory: AnyFactory) -> Result<Self, RegistryError> {
        let kind = factory.kind();
        let type_name = factory.type_name().to_string();
        if type_name.is_empty() {
            return Err(RegistryError::EmptyTypeName { kind });
        }

        let entries = self.factories.by_kind.entry(kind).or_default();
        if entries.contains_key(&type_name) {
            return Err(RegistryError::Duplicate { kind, type_name });
        }
        entries.insert(type_name, factory);
        Ok(self)
    }

    pub fn with_receiver(self, f: impl ReceiverFactory + 'static) -> Result<Self, RegistryError> {
        self.register(AnyFactory::Receiver(Arc::new(f)))
    }

    pub fn with_processor(self, f: impl ProcessorFactory + 'static) -> Result<Self, RegistryError> {
        self.register(AnyFactory::Processor(Arc::new(f)))
    }

    pub fn with_exporter(self, f: impl ExporterFactory + 'static) -> Result<Self, RegistryError> {
        self.register(AnyFactory::Exporter(Arc::new(f)))
    }

    pub fn with_extension(self, f: impl ExtensionFactory + 'static) -> Result<Self, RegistryError> {
        self.register(AnyFactory::Extension(Arc::new(f)))
    }

    pub fn build(self) -> Result<Factories, RegistryError> {
        for (kind, entries) in &self.factories.by_kind {
            for (type_name, factory) in entries {
                if factory.default_config().is_null() {
                    return Err(RegistryError::NilDefaultConfig {
                        kind: *kind,
                        type_name: type_name.clone(),
                    });
                }
            }
        }
        Ok(self.factories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct NopExporterFactory {
        type_name: &'static str,
        default: Value,
    }

    impl Factory for NopExporterFactory {
        fn type_name(&self) -> &str {
            self.type_name
        }

        fn default_config(&self) -> Value {
            self.default.clone()
        }
    }

    impl ExporterFactory for NopExporterFactory {
        fn create_exporter(
            &self,
            _settings: CreateSettings,
            _config: &Value,
        ) -> Result<Option<Arc<dyn Exporter>>, BoxError> {
            Ok(None)
        }
    }

    fn nop(type_name: &'static str) -> NopExporterFactory {
        NopExporterFactory {
            type_name,
            default: json!({}),
        }
    }

    #[test]
    fn register_and_lookup() {
        let factories = Factories::builder()
            .with_exporter(nop("a"))
            .unwrap()
            .with_exporter(nop("b"))
            .unwrap()
            .build()
            .unwrap();

        assert!(factories.exporter("a").is_some());
        assert!(factories.exporter("c").is_none());
        assert!(factories.receiver("a").is_none());

        let found = factories.lookup(Kind::Exporter, "b").unwrap();
        assert_eq!(Kind::Exporter, found.kind());
        assert_eq!("b", found.type_name());

        let keys: Vec<String> = factories.of_kind(Kind::Exporter).into_keys().collect();
        assert_eq!(vec!["a", "b"], keys);
        assert!(factories.of_kind(Kind::Extension).is_empty());
    }

    #[test]
    fn duplicate_registration_fails() {
        let res = Factories::builder()
            .with_exporter(nop("a"))
            .unwrap()
            .with_exporter(nop("a"));

        assert_eq!(
            RegistryError::Duplicate {
                kind: Kind::Exporter,
                type_name: "a".to_string()
            },
            res.err().unwrap()
        );
    }

    #[test]
    fn nil_default_config_rejected() {
        let res = Factories::builder()
            .with_exporter(NopExporterFactory {
                type_name: "null",
                default: Value::Null,
            })
            .unwrap()
            .build();

        let err = res.err().unwrap();
        assert_eq!(
            "exporter factory \"null\" has a nil default config",
            err.to_string()
        );
    }

    #[test]
    fn empty_type_rejected() {
        let res = Factories::builder().with_exporter(nop(""));
        assert_eq!(
            RegistryError::EmptyTypeName {
                kind: Kind::Exporter
            },
            res.err().unwrap()
        );
    }
}
