//! CLI for PopHub
//!
//! Starts the WebSocket server. Flags override values from the
//! configuration file and environment.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use pophub::broker::Registry;
use pophub::config::{Settings, load_config, load_config_from, validate};
use pophub::transport::start_websocket_server;
use pophub::utils::{HubError, logging};
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "pophub", version, about, disable_help_flag = true)]
struct Cli {
    /// Server host
    #[arg(short = 'h', long)]
    host: Option<String>,
    /// Server port
    #[arg(short, long)]
    port: Option<u16>,
    /// Configuration file (defaults to config/default.toml)
    #[arg(short, long)]
    config: Option<String>,
    /// Log level: error, warn, info, debug or trace
    #[arg(short, long)]
    log_level: Option<String>,
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn settings(&self) -> Result<Settings, HubError> {
        let mut settings = match &self.config {
            Some(path) => load_config_from(path)?,
            None => load_config()?,
        };
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.log.level = level.clone();
        }
        validate(&settings)?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(&Settings::default().log);
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log);

    match run_server(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(settings: Settings) -> Result<(), HubError> {
    let addr = settings.addr();
    let registry = Arc::new(Registry::new());

    tokio::select! {
        result = start_websocket_server(&addr, registry, settings) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}
