// SPDX-License-Identifier: Apache-2.0

use crate::bounded_channel::{BoundedSender, TrySendError};
use crate::component::{AnyFactory, Factories, Host, Kind};
use crate::config::Config;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{error, warn};

/// The [`Host`] handed to components by the service.
pub(crate) struct ServiceHost {
    factories: Arc<Factories>,
    config: RwLock<Arc<Config>>,
    fatal_tx: BoundedSender<BoxError>,
    shutting_down: AtomicBool,
    replacing: AtomicBool,
    context: CancellationToken,
}

impl ServiceHost {
    pub(crate) fn new(
        factories: Arc<Factories>,
        config: Arc<Config>,
        fatal_tx: BoundedSender<BoxError>,
        context: CancellationToken,
    ) -> Self {
        Self {
            factories,
            config: RwLock::new(config),
            fatal_tx,
            shutting_down: AtomicBool::new(false),
            replacing: AtomicBool::new(false),
            context,
        }
    }

    pub(crate) fn set_config(&self, config: Arc<Config>) {
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }

    /// From here on fatal errors are logged and dropped.
    pub(crate) fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// While set, fatal errors come from components being replaced by a reload and
    /// are logged and dropped.
    pub(crate) fn begin_replacing(&self) {
        self.replacing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn end_replacing(&self) {
        self.replacing.store(false, Ordering::SeqCst);
    }
}

impl Host for ServiceHost {
    fn report_fatal_error(&self, err: BoxError) {
        if self.shutting_down.load(Ordering::SeqCst) {
            warn!(error = %err, "Fatal error reported while shutting down, ignoring.");
            return;
        }
        if self.replacing.load(Ordering::SeqCst) {
            warn!(error = %err, "Fatal error reported by a component being replaced, ignoring.");
            return;
        }

        error!(error = %err, "Component reported a fatal error.");
        match self.fatal_tx.try_send(err) {
            Ok(()) => {}
            Err(TrySendError::Full(err)) => {
                warn!(error = %err, "A fatal error is already pending, dropping this one.")
            }
            Err(TrySendError::Disconnected(err)) => {
                warn!(error = %err, "Service is no longer running, dropping fatal error.")
            }
        }
    }

    fn get_factories(&self, kind: Kind) -> BTreeMap<String, AnyFactory> {
        self.factories.of_kind(kind)
    }

    fn get_config(&self) -> Arc<Config> {
        match self.config.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn context(&self) -> CancellationToken {
        self.context.clone()
    }
}
