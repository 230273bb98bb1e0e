// SPDX-License-Identifier: Apache-2.0

//! The service's own logging. The binary installs a global subscriber whose level
//! filter can be swapped at runtime; `service.telemetry.logs.level` drives it.

use crate::config::TelemetryConfig;
use tower::BoxError;
use tracing::info;
use tracing::metadata::LevelFilter;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Applies the telemetry section of a configuration. Called on every (re)load before
/// any component is started.
pub trait Telemetry: Send + Sync {
    fn apply(&self, config: &TelemetryConfig) -> Result<(), BoxError>;

    fn shutdown(&self) {}
}

/// Accepts any telemetry settings and does nothing with them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn apply(&self, config: &TelemetryConfig) -> Result<(), BoxError> {
        config.logs.level_filter()?;
        Ok(())
    }
}

/// Reloads the level filter of the global subscriber installed by [`setup_logging`].
pub struct LogTelemetry {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogTelemetry {
    pub fn new(handle: reload::Handle<EnvFilter, Registry>) -> Self {
        Self { handle }
    }
}

impl Telemetry for LogTelemetry {
    fn apply(&self, config: &TelemetryConfig) -> Result<(), BoxError> {
        let level = config.logs.level_filter()?;
        self.handle.reload(build_filter(level)?)?;
        info!(level = %level, "Applied log level.");
        Ok(())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum LogFormat {
    Text,
    Json,
}

pub type LoggerGuard = tracing_appender::non_blocking::WorkerGuard;

fn build_filter(level: LevelFilter) -> Result<EnvFilter, BoxError> {
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env()?
        .add_directive("hyper=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?)
        .add_directive("notify=warn".parse()?))
}

/// Installs the global subscriber. The returned guard must be held for as long as
/// logs should be flushed.
pub fn setup_logging(
    log_format: LogFormat,
    app_name: String,
) -> Result<(LoggerGuard, LogTelemetry), BoxError> {
    LogTracer::init()?;

    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let (filter, handle) = reload::Layer::new(build_filter(LevelFilter::INFO)?);

    if log_format == LogFormat::Json {
        let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);

        let subscriber = Registry::default()
            .with(filter)
            .with(JsonStorageLayer)
            .with(bunyan_formatting_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        use std::io;
        use std::io::IsTerminal;

        // Skip color codes when not in a terminal
        let use_ansi = io::stdout().is_terminal();

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking_writer)
            .with_target(false)
            .with_level(true)
            .with_ansi(use_ansi)
            .compact();

        let subscriber = Registry::default().with(filter).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok((guard, LogTelemetry::new(handle)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogsConfig;

    #[test]
    fn noop_validates_level() {
        let mut cfg = TelemetryConfig::default();
        assert!(NoopTelemetry.apply(&cfg).is_ok());

        cfg.logs = LogsConfig {
            level: "verbose".to_string(),
        };
        assert!(NoopTelemetry.apply(&cfg).is_err());
    }

    #[test]
    fn reload_filter() {
        let (filter, handle) = reload::Layer::new(build_filter(LevelFilter::INFO).unwrap());
        let subscriber = Registry::default().with(filter);
        let telemetry = LogTelemetry::new(handle.clone());

        tracing::subscriber::with_default(subscriber, || {
            let cfg = TelemetryConfig {
                logs: LogsConfig {
                    level: "debug".to_string(),
                },
            };
            telemetry.apply(&cfg).unwrap();
            let current = handle.with_current(|f| f.to_string()).unwrap();
            assert!(current.contains("debug"), "{}", current);
        });
    }
}
