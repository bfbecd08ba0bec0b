use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use cardgate_daemon::{ExitReason, Gateway, GatewayConfig, LogFormat, logging, signals};
use clap::Parser;
use tracing::{error, info};

/// Exit status for an unusable configuration.
const EXIT_CONFIG_ERROR: u8 = 2;

/// Forward card scans from a serial reader to an HTTP collector.
#[derive(Debug, Parser)]
#[command(name = "cardgated", version, about)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        env = "CARDGATE_CONFIG",
        default_value = "/etc/cardgate/cardgate.toml"
    )]
    config: PathBuf,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_format) {
        eprintln!("cardgated: cannot initialize logging: {e}");
    }

    let config = match GatewayConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "Invalid configuration");
            eprintln!("cardgated: {}: {e}", cli.config.display());
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    if cli.check_config {
        println!("{}: configuration OK", cli.config.display());
        return ExitCode::SUCCESS;
    }

    info!(
        version = cardgate_core::VERSION,
        device_id = %config.device_id,
        endpoint = %config.endpoint,
        "Starting cardgated"
    );

    match run(&config) {
        Ok(ExitReason::Signal) => {
            info!("Exiting after shutdown signal");
            ExitCode::SUCCESS
        }
        Ok(ExitReason::UpdateInstalled(marker)) => {
            info!(marker = %marker.short(), "Exiting to restart on updated code");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "Gateway failed");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &GatewayConfig) -> anyhow::Result<ExitReason> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    runtime.block_on(async {
        let gateway = Gateway::from_config(config).context("cannot build gateway")?;
        let reason = gateway.run(signals::wait_for_shutdown()).await?;
        Ok(reason)
    })
}
