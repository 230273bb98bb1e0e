// SPDX-License-Identifier: Apache-2.0

use clap::{Parser, ValueEnum};
use rotel_service::component::BuildInfo;
use rotel_service::components;
use rotel_service::init::args::ServiceRun;
use rotel_service::service::{DefaultConfigProvider, Service, ServiceSettings};
use rotel_service::telemetry::{LogFormat, setup_logging};
use std::process::ExitCode;
use std::sync::Arc;
use tower::BoxError;
use tracing::{error, info};

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Run the service
    Start(Box<ServiceRun>),

    /// Return version
    Version,
}

#[derive(Debug, Parser)]
#[command(name = "rotel-service")]
#[command(bin_name = "rotel-service")]
#[command(version, about, long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[arg(
        value_enum,
        long,
        global = true,
        env = "ROTEL_LOG_FORMAT",
        default_value = "text"
    )]
    /// Log format
    log_format: LogFormatArg,

    #[arg(long, global = true, env = "ROTEL_ENVIRONMENT", default_value = "dev")]
    /// Environment
    environment: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    match opt.command {
        Some(Commands::Version) => {
            println!("{}", get_version())
        }
        Some(Commands::Start(run)) => {
            let (_guard, telemetry) =
                match setup_logging(opt.log_format.into(), "rotel-service".to_string()) {
                    Ok(v) => v,
                    Err(e) => {
                        eprintln!("ERROR: failed to setup logging: {}", e);
                        return ExitCode::from(1);
                    }
                };

            info!(environment = opt.environment, version = get_version(), "Initializing.");

            if let Err(e) = run_service(run, Arc::new(telemetry)) {
                error!(error = e, "Service exited with an error.");
                return ExitCode::from(1);
            }
        }
        _ => {
            // it shouldn't be possible to get here since we mark a subcommand as
            // required
            error!("Must specify a command");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}

#[tokio::main]
async fn run_service(
    run: Box<ServiceRun>,
    telemetry: Arc<rotel_service::telemetry::LogTelemetry>,
) -> Result<(), BoxError> {
    let factories = components::factories()?;
    let provider = DefaultConfigProvider::from_uris(run.config)?;

    let mut settings = ServiceSettings::new(factories, Box::new(provider));
    settings.build_info = BuildInfo {
        version: get_version(),
        ..BuildInfo::default()
    };
    settings.telemetry = telemetry;
    settings.watch_config = !run.no_watch;

    Service::new(settings).run().await?;
    Ok(())
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}
