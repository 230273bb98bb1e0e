// SPDX-License-Identifier: Apache-2.0

use clap::Args;

#[derive(Debug, Args, Clone)]
pub struct ServiceRun {
    /// Configuration sources, merged in order. A source is a file path or a URI
    /// such as file:, env:, yaml: or http:
    #[arg(
        long = "config",
        env = "ROTEL_SERVICE_CONFIG",
        required = true,
        action = clap::ArgAction::Append,
        value_delimiter = ','
    )]
    pub config: Vec<String>,

    /// Stop watching configuration sources for changes
    #[arg(long, env = "ROTEL_SERVICE_NO_WATCH", default_value = "false")]
    pub no_watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        run: ServiceRun,
    }

    #[test]
    fn repeated_and_delimited_configs() {
        let cli = Cli::try_parse_from([
            "rotel-service",
            "--config",
            "/etc/base.yaml",
            "--config",
            "env:EXTRA,yaml:service::telemetry::logs::level: debug",
        ])
        .unwrap();

        assert_eq!(
            vec![
                "/etc/base.yaml",
                "env:EXTRA",
                "yaml:service::telemetry::logs::level: debug"
            ],
            cli.run.config
        );
        assert!(!cli.run.no_watch);
    }

    #[test]
    fn config_is_required() {
        // Skip when the environment already provides one
        if std::env::var("ROTEL_SERVICE_CONFIG").is_ok() {
            return;
        }
        assert!(Cli::try_parse_from(["rotel-service"]).is_err());
    }
}
