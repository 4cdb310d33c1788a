use std::process::ExitCode;

use clap::Parser;
use log::{debug, info};
use research_notes::{report_error, App, Cli, Config, ResearchError, Result};

pub fn initialize_logger(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    debug!("Logger initialized");
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .config
        .or_else(Config::default_path)
        .ok_or_else(|| ResearchError::ConfigError {
            message: "Could not determine a configuration directory; pass --config".to_string(),
        })?;

    let mut config = Config::load(&config_path)?;
    if let Some(notes_dir) = cli.notes_dir {
        config.notes_dir = notes_dir;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }

    let app = App::new(config, config_path, cli.verbose);
    app.run(cli.command).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    if let Err(e) = dotenv::dotenv() {
        debug!("No .env file loaded: {}", e);
    }

    info!("Application starting up");
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}
