// SPDX-License-Identifier: Apache-2.0

use crate::component::{Factories, RegistryError};
use crate::exporters::blackhole::BlackholeExporterFactory;
use crate::exporters::debug::DebugExporterFactory;
use crate::extensions::config_ui::ConfigUiFactory;
use crate::extensions::health_check::HealthCheckFactory;
use crate::processors::batch::BatchProcessorFactory;
use crate::receivers::http::HttpReceiverFactory;

/// Every component type built into the binary.
pub fn factories() -> Result<Factories, RegistryError> {
    Factories::builder()
        .with_receiver(HttpReceiverFactory)?
        .with_processor(BatchProcessorFactory)?
        .with_exporter(DebugExporterFactory)?
        .with_exporter(BlackholeExporterFactory)?
        .with_extension(HealthCheckFactory)?
        .with_extension(ConfigUiFactory)?
        .build()
}
