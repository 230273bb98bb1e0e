// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use async_trait::async_trait;
use rotel_service::component::{
    Component, ComponentId, CreateSettings, Exporter, ExporterFactory, Extension,
    ExtensionFactory, Factories, Factory, Host, PipelineWatcher, Processor, ProcessorFactory,
    Receiver, ReceiverFactory,
};
use rotel_service::config::{Config, ConfigError};
use rotel_service::confmap::{self, ChangeNotifier, ConfigWatch};
use rotel_service::service::{ConfigProvider, Service, ServiceSettings};
use rotel_service::topology::consumer::Consumer;
use rotel_service::topology::payload::Message;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::BoxError;

pub const RECEIVER: &str = "mockrecv";
pub const PROCESSOR: &str = "mockproc";
pub const EXPORTER: &str = "mockexp";
pub const EXTENSION: &str = "mockext";

/// Shared event log and failure plan for the mock components. Events are named
/// `<label>.<step>`, where the label is the component name (`mockexp/C` is `C`).
#[derive(Default)]
pub struct Script {
    events: Mutex<Vec<String>>,
    failures: Mutex<HashSet<String>>,
    nil: Mutex<HashSet<String>>,
    fatal: Mutex<HashSet<String>>,
    host: Mutex<Option<Arc<dyn Host>>>,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the given event (`"C.start"`) return an error.
    pub fn fail(&self, event: &str) {
        self.failures.lock().unwrap().insert(event.to_string());
    }

    pub fn succeed(&self, event: &str) {
        self.failures.lock().unwrap().remove(event);
    }

    /// Makes the component report a fatal error to its host when `event` happens.
    pub fn fatal_on(&self, event: &str) {
        self.fatal.lock().unwrap().insert(event.to_string());
    }

    /// Makes the factory for `label` return no component.
    pub fn nil(&self, label: &str) {
        self.nil.lock().unwrap().insert(label.to_string());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Lifecycle events only, without the `.create` and `.consume` noise.
    pub fn lifecycle(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| !e.ends_with(".create") && !e.ends_with(".consume"))
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// The host handed to the most recently started component.
    pub fn host(&self) -> Option<Arc<dyn Host>> {
        self.host.lock().unwrap().clone()
    }

    fn record(&self, event: String) -> Result<(), BoxError> {
        self.events.lock().unwrap().push(event.clone());
        if self.fatal.lock().unwrap().contains(&event) {
            if let Some(host) = self.host() {
                host.report_fatal_error(format!("{} hit a fatal error", event).into());
            }
        }
        if self.failures.lock().unwrap().contains(&event) {
            return Err(format!("{} failed", event).into());
        }
        Ok(())
    }

    fn is_nil(&self, label: &str) -> bool {
        self.nil.lock().unwrap().contains(label)
    }
}

fn label(id: &ComponentId) -> String {
    id.name().unwrap_or(id.type_name()).to_string()
}

pub struct Mock {
    label: String,
    script: Arc<Script>,
    next: Option<Arc<dyn Consumer>>,
}

#[async_trait]
impl Component for Mock {
    async fn start(&self, host: Arc<dyn Host>) -> Result<(), BoxError> {
        *self.script.host.lock().unwrap() = Some(host);
        self.script.record(format!("{}.start", self.label))
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        self.script.record(format!("{}.shutdown", self.label))
    }
}

#[async_trait]
impl Consumer for Mock {
    async fn consume(&self, message: Message) -> Result<(), BoxError> {
        self.script.record(format!("{}.consume", self.label))?;
        match &self.next {
            Some(next) => next.consume(message).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PipelineWatcher for Mock {
    async fn ready(&self) -> Result<(), BoxError> {
        self.script.record(format!("{}.ready", self.label))
    }

    async fn not_ready(&self) -> Result<(), BoxError> {
        self.script.record(format!("{}.not_ready", self.label))
    }
}

impl Receiver for Mock {}
impl Processor for Mock {}
impl Exporter for Mock {}

impl Extension for Mock {
    fn pipeline_watcher(&self) -> Option<&dyn PipelineWatcher> {
        Some(self)
    }
}

pub struct MockFactory {
    type_name: &'static str,
    script: Arc<Script>,
}

impl MockFactory {
    fn create(
        &self,
        settings: &CreateSettings,
        next: Option<Arc<dyn Consumer>>,
    ) -> Result<Option<Arc<Mock>>, BoxError> {
        let label = label(&settings.id);
        self.script.record(format!("{}.create", label))?;
        if self.script.is_nil(&label) {
            return Ok(None);
        }
        Ok(Some(Arc::new(Mock {
            label,
            script: self.script.clone(),
            next,
        })))
    }
}

impl Factory for MockFactory {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn default_config(&self) -> Value {
        json!({ "setting": "default" })
    }
}

impl ReceiverFactory for MockFactory {
    fn create_receiver(
        &self,
        settings: CreateSettings,
        _config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Receiver>>, BoxError> {
        Ok(self
            .create(&settings, Some(next))?
            .map(|m| m as Arc<dyn Receiver>))
    }
}

impl ProcessorFactory for MockFactory {
    fn create_processor(
        &self,
        settings: CreateSettings,
        _config: &Value,
        next: Arc<dyn Consumer>,
    ) -> Result<Option<Arc<dyn Processor>>, BoxError> {
        Ok(self
            .create(&settings, Some(next))?
            .map(|m| m as Arc<dyn Processor>))
    }
}

impl ExporterFactory for MockFactory {
    fn create_exporter(
        &self,
        settings: CreateSettings,
        _config: &Value,
    ) -> Result<Option<Arc<dyn Exporter>>, BoxError> {
        Ok(self.create(&settings, None)?.map(|m| m as Arc<dyn Exporter>))
    }
}

impl ExtensionFactory for MockFactory {
    fn create_extension(
        &self,
        settings: CreateSettings,
        _config: &Value,
    ) -> Result<Option<Arc<dyn Extension>>, BoxError> {
        Ok(self
            .create(&settings, None)?
            .map(|m| m as Arc<dyn Extension>))
    }
}

pub fn factories(script: &Arc<Script>) -> Factories {
    let mock = |type_name| MockFactory {
        type_name,
        script: script.clone(),
    };
    Factories::builder()
        .with_receiver(mock(RECEIVER))
        .unwrap()
        .with_processor(mock(PROCESSOR))
        .unwrap()
        .with_exporter(mock(EXPORTER))
        .unwrap()
        .with_extension(mock(EXTENSION))
        .unwrap()
        .build()
        .unwrap()
}

/// What the service reported back to the provider, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

/// Serves configuration from a YAML string the test can swap at runtime.
pub struct ProviderState {
    yaml: Mutex<String>,
    outcomes: Mutex<Vec<Outcome>>,
    notifier: ChangeNotifier,
}

impl ProviderState {
    /// Replaces the document and notifies the service.
    pub fn update(&self, yaml: &str) {
        *self.yaml.lock().unwrap() = yaml.to_string();
        self.notifier.changed();
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

pub struct ScriptedConfigProvider {
    state: Arc<ProviderState>,
    watch: Option<ConfigWatch>,
}

pub fn scripted_provider(yaml: &str) -> (ScriptedConfigProvider, Arc<ProviderState>) {
    let (notifier, watch) = confmap::watch_channel();
    let state = Arc::new(ProviderState {
        yaml: Mutex::new(yaml.to_string()),
        outcomes: Mutex::new(Vec::new()),
        notifier,
    });
    (
        ScriptedConfigProvider {
            state: state.clone(),
            watch: Some(watch),
        },
        state,
    )
}

#[async_trait]
impl ConfigProvider for ScriptedConfigProvider {
    async fn get(&mut self, factories: &Factories) -> Result<Config, ConfigError> {
        let yaml = self.state.yaml.lock().unwrap().clone();
        let raw = confmap::parse_yaml("test:", &yaml)?;
        let cfg = Config::unmarshal(raw, factories)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn watch(&mut self) -> ConfigWatch {
        match self.watch.take() {
            Some(w) => w,
            None => confmap::watch_channel().1,
        }
    }

    async fn shutdown(&mut self) -> Result<(), ConfigError> {
        Ok(())
    }

    fn config_update_succeeded(&mut self) {
        self.state.outcomes.lock().unwrap().push(Outcome::Succeeded);
    }

    fn config_update_failed(&mut self, err: &(dyn Error + Send + Sync)) {
        self.state
            .outcomes
            .lock()
            .unwrap()
            .push(Outcome::Failed(err.to_string()));
    }
}

/// A service over the mock factories that ignores OS signals.
pub fn service(script: &Arc<Script>, yaml: &str) -> (Service, Arc<ProviderState>) {
    let (provider, state) = scripted_provider(yaml);
    let mut settings = ServiceSettings::new(factories(script), Box::new(provider));
    settings.handle_signals = false;
    (Service::new(settings), state)
}

/// Polls `cond` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let res = tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(res.is_ok(), "timed out waiting for {}", what);
}

/// Receiver A, processor B and exporter C in one traces pipeline, with extension D.
pub const SIMPLE: &str = r#"
receivers:
  mockrecv/A:
processors:
  mockproc/B:
exporters:
  mockexp/C:
extensions:
  mockext/D:
service:
  extensions: [mockext/D]
  pipelines:
    traces:
      receivers: [mockrecv/A]
      processors: [mockproc/B]
      exporters: [mockexp/C]
"#;
