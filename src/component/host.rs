// SPDX-License-Identifier: Apache-2.0

use crate::component::{AnyFactory, Kind};
use crate::config::Config;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::BoxError;

/// Capabilities the service exposes to running components.
pub trait Host: Send + Sync {
    /// Asks the service to shut down. Never blocks, and is safe to call from any
    /// task, including while the service is already shutting down.
    fn report_fatal_error(&self, err: BoxError);

    fn get_factories(&self, kind: Kind) -> BTreeMap<String, AnyFactory>;

    fn get_config(&self) -> Arc<Config>;

    /// Cancelled once the service has terminated.
    fn context(&self) -> CancellationToken;
}
