// SPDX-License-Identifier: Apache-2.0

//! The application lifecycle: load configuration, start extensions and pipelines,
//! run until a shutdown trigger arrives, then tear everything down in reverse.

pub mod config_provider;
pub mod error;
pub mod extensions;
pub(crate) mod host;

pub use config_provider::{ConfigProvider, DefaultConfigProvider};
pub use error::{Errors, ServiceError};
pub use extensions::Extensions;

use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};
use crate::component::{BuildInfo, Factories, Host};
use crate::config::Config;
use crate::init::signal::signal_wait;
use crate::telemetry::{NoopTelemetry, Telemetry};
use crate::topology::builder::Topology;
use host::ServiceHost;
use std::sync::Arc;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

// Only the first fatal error matters, later ones are logged and dropped
const FATAL_ERROR_QUEUE_SIZE: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    ConfigLoading,
    TelemetryInit,
    ExtensionsStarting,
    PipelinesStarting,
    Running,
    ShutdownTriggered,
    NotifyingNotReady,
    PipelinesStopping,
    ExtensionsStopping,
    Terminated,
}

pub struct ServiceSettings {
    pub build_info: BuildInfo,
    pub factories: Factories,
    pub config_provider: Box<dyn ConfigProvider>,
    pub telemetry: Arc<dyn Telemetry>,
    /// Treat SIGTERM and SIGINT as shutdown triggers.
    pub handle_signals: bool,
    /// Reload when a configuration source reports a change.
    pub watch_config: bool,
}

impl ServiceSettings {
    pub fn new(factories: Factories, config_provider: Box<dyn ConfigProvider>) -> Self {
        Self {
            build_info: BuildInfo::default(),
            factories,
            config_provider,
            telemetry: Arc::new(NoopTelemetry),
            handle_signals: true,
            watch_config: true,
        }
    }
}

/// Observes and stops a running [`Service`] from other tasks.
#[derive(Clone)]
pub struct ServiceHandle {
    stop: CancellationToken,
    state: watch::Receiver<State>,
}

impl ServiceHandle {
    /// Requests a graceful shutdown. Has no effect once the service is shutting down.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Waits until the service reaches `target` or terminates, returning the state
    /// that ended the wait.
    pub async fn wait_for(&mut self, target: State) -> State {
        let reached = self
            .state
            .wait_for(|s| *s == target || *s == State::Terminated)
            .await
            .map(|s| *s);
        match reached {
            Ok(s) => s,
            Err(_) => *self.state.borrow(),
        }
    }
}

struct Generation {
    config: Arc<Config>,
    extensions: Extensions,
    topology: Option<Topology>,
}

enum Trigger {
    Signal,
    Stop,
    Fatal(BoxError),
}

pub struct Service {
    build_info: BuildInfo,
    factories: Arc<Factories>,
    config_provider: Box<dyn ConfigProvider>,
    telemetry: Arc<dyn Telemetry>,
    handle_signals: bool,
    watch_config: bool,
    state: watch::Sender<State>,
    stop: CancellationToken,
    context: CancellationToken,
    fatal_tx: BoundedSender<BoxError>,
    fatal_rx: BoundedReceiver<BoxError>,
}

impl Service {
    pub fn new(settings: ServiceSettings) -> Self {
        let (fatal_tx, fatal_rx) = bounded(FATAL_ERROR_QUEUE_SIZE);
        let (state, _) = watch::channel(State::Created);

        Self {
            build_info: settings.build_info,
            factories: Arc::new(settings.factories),
            config_provider: settings.config_provider,
            telemetry: settings.telemetry,
            handle_signals: settings.handle_signals,
            watch_config: settings.watch_config,
            state,
            stop: CancellationToken::new(),
            context: CancellationToken::new(),
            fatal_tx,
            fatal_rx,
        }
    }

    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            stop: self.stop.clone(),
            state: self.state.subscribe(),
        }
    }

    fn set_state(&self, state: State) {
        debug!(state = ?state, "Service state changed.");
        self.state.send_replace(state);
    }

    /// Runs the service to completion. Returns an error if startup failed, if the
    /// service stopped because of a fatal error, or if anything failed to shut down.
    pub async fn run(mut self) -> Result<(), ServiceError> {
        info!(
            command = self.build_info.command.as_str(),
            version = self.build_info.version.as_str(),
            "Starting service."
        );

        let (generation, host) = match self.start_up().await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "Failed to start service.");
                if let Err(se) = self.config_provider.shutdown().await {
                    warn!(error = %se, "Failed to shut down the config provider.");
                }
                self.terminate();
                return Err(e);
            }
        };

        self.set_state(State::Running);
        info!("Everything is ready. Begin running and processing data.");

        let mut generation = generation;
        let trigger = self.wait_for_shutdown(&mut generation, &host).await;

        self.set_state(State::ShutdownTriggered);
        host.begin_shutdown();

        let mut errs = Errors::new();
        match trigger {
            Trigger::Signal => info!("Received shutdown signal, starting shutdown."),
            Trigger::Stop => info!("Shutdown requested, starting shutdown."),
            Trigger::Fatal(e) => {
                error!(error = %e, "Fatal error, starting shutdown.");
                errs.push(ServiceError::Fatal(e));
            }
        }

        self.tear_down(generation, &mut errs).await;
        errs.capture(self.config_provider.shutdown().await.map_err(ServiceError::from));

        self.terminate();
        info!("Shutdown complete.");

        errs.into_result()
    }

    async fn start_up(&mut self) -> Result<(Generation, Arc<ServiceHost>), ServiceError> {
        self.set_state(State::ConfigLoading);
        let config = match self.config_provider.get(&self.factories).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                self.config_provider.config_update_failed(&e);
                return Err(ServiceError::stage("cannot load configuration", e.into()));
            }
        };

        self.set_state(State::TelemetryInit);
        self.telemetry
            .apply(&config.service.telemetry)
            .map_err(ServiceError::Telemetry)?;

        let host = Arc::new(ServiceHost::new(
            self.factories.clone(),
            config.clone(),
            self.fatal_tx.clone(),
            self.context.child_token(),
        ));

        self.set_state(State::ExtensionsStarting);
        let mut extensions =
            Extensions::build_and_start(&config, &self.factories, &self.build_info, host.clone())
                .await
                .map_err(|e| ServiceError::stage("cannot start extensions", e))?;

        self.set_state(State::PipelinesStarting);
        let topology = match Topology::build_and_start(
            &config,
            &self.factories,
            &self.build_info,
            host.clone(),
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                host.begin_shutdown();
                log_failure("stopping extensions", extensions.shutdown().await);
                return Err(ServiceError::stage("cannot start pipelines", e));
            }
        };

        if let Err(e) = extensions.notify_pipeline_ready().await {
            host.begin_shutdown();
            log_failure("notifying extensions", extensions.notify_pipeline_not_ready().await);
            log_failure("stopping pipelines", topology.shutdown().await);
            log_failure("stopping extensions", extensions.shutdown().await);
            return Err(e);
        }

        self.config_provider.config_update_succeeded();

        Ok((
            Generation {
                config,
                extensions,
                topology: Some(topology),
            },
            host,
        ))
    }

    async fn wait_for_shutdown(
        &mut self,
        generation: &mut Generation,
        host: &Arc<ServiceHost>,
    ) -> Trigger {
        let mut watch = self.config_provider.watch();
        let mut watching = self.watch_config;

        let signals = shutdown_signal(self.handle_signals);
        tokio::pin!(signals);

        loop {
            select! {
                Some(err) = self.fatal_rx.next() => return Trigger::Fatal(err),
                _ = self.stop.cancelled() => return Trigger::Stop,
                _ = &mut signals => return Trigger::Signal,
                event = watch.next(), if watching => match event {
                    None => {
                        debug!("Config watch closed, no further reloads.");
                        watching = false;
                    }
                    Some(Ok(())) => {
                        if let Err(e) = self.reload(generation, host).await {
                            return Trigger::Fatal(e.into());
                        }
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Config watch failed.");
                        return Trigger::Fatal(e.into());
                    }
                },
            }
        }
    }

    /// Applies a changed configuration. An error return means the service could not
    /// get back to a running state and must shut down.
    async fn reload(
        &mut self,
        generation: &mut Generation,
        host: &Arc<ServiceHost>,
    ) -> Result<(), ServiceError> {
        info!("Configuration changed, reloading.");

        let config = match self.config_provider.get(&self.factories).await {
            Ok(c) => Arc::new(c),
            Err(e) => {
                error!(error = %e, "Failed to load the changed configuration, keeping the current one.");
                self.config_provider.config_update_failed(&e);
                return Ok(());
            }
        };

        match self.apply(generation, config, host, false).await {
            Ok(()) => {
                self.config_provider.config_update_succeeded();
                info!("Configuration reloaded.");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to apply the changed configuration, restoring the previous one.");
                self.config_provider.config_update_failed(&e);

                let previous = generation.config.clone();
                self.apply(generation, previous, host, true)
                    .await
                    .map_err(|re| ServiceError::stage("cannot restore the previous configuration", re))
            }
        }
    }

    /// Replaces the running pipelines with ones built from `config`. Extensions are
    /// only rebuilt when their section changed or `rebuild_extensions` is set.
    async fn apply(
        &self,
        generation: &mut Generation,
        config: Arc<Config>,
        host: &Arc<ServiceHost>,
        rebuild_extensions: bool,
    ) -> Result<(), ServiceError> {
        // Fatal reports from the stopping generation are dropped
        host.begin_replacing();
        log_failure(
            "notifying extensions",
            generation.extensions.notify_pipeline_not_ready().await,
        );
        if let Some(topology) = generation.topology.take() {
            log_failure("stopping pipelines", topology.shutdown().await);
        }

        let rebuild_extensions =
            rebuild_extensions || generation.config.extensions_changed(&config);
        if rebuild_extensions {
            log_failure("stopping extensions", generation.extensions.shutdown().await);
        }
        host.end_replacing();
        self.discard_pending_fatal();

        host.set_config(config.clone());
        self.telemetry
            .apply(&config.service.telemetry)
            .map_err(ServiceError::Telemetry)?;

        let dyn_host: Arc<dyn Host> = host.clone();
        if rebuild_extensions {
            generation.extensions = Extensions::build_and_start(
                &config,
                &self.factories,
                &self.build_info,
                dyn_host.clone(),
            )
            .await
            .map_err(|e| ServiceError::stage("cannot start extensions", e))?;
        }

        generation.topology = Some(
            Topology::build_and_start(&config, &self.factories, &self.build_info, dyn_host)
                .await
                .map_err(|e| ServiceError::stage("cannot start pipelines", e))?,
        );
        generation.extensions.notify_pipeline_ready().await?;

        generation.config = config;
        Ok(())
    }

    /// Drops fatal errors queued by the generation that was just stopped.
    fn discard_pending_fatal(&self) {
        while let Some(err) = self.fatal_rx.try_recv() {
            warn!(error = %err, "Discarding fatal error from replaced components.");
        }
    }

    async fn tear_down(&self, mut generation: Generation, errs: &mut Errors) {
        self.set_state(State::NotifyingNotReady);
        errs.capture(generation.extensions.notify_pipeline_not_ready().await);

        self.set_state(State::PipelinesStopping);
        if let Some(topology) = generation.topology.take() {
            errs.capture(
                topology
                    .shutdown()
                    .await
                    .map_err(|e| ServiceError::stage("failed to shut down pipelines", e)),
            );
        }

        self.set_state(State::ExtensionsStopping);
        errs.capture(
            generation
                .extensions
                .shutdown()
                .await
                .map_err(|e| ServiceError::stage("failed to shut down extensions", e)),
        );
    }

    fn terminate(&self) {
        self.telemetry.shutdown();
        self.context.cancel();
        self.set_state(State::Terminated);
    }
}

async fn shutdown_signal(enabled: bool) {
    if enabled {
        signal_wait().await
    } else {
        std::future::pending::<()>().await
    }
}

fn log_failure(what: &'static str, res: Result<(), ServiceError>) {
    if let Err(e) = res {
        warn!(error = %e, "Error while {}.", what);
    }
}
