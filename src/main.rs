use clap::Parser;
use invitabot::{BotError, cli, logging};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file before anything else (silently ignore if missing)
    dotenvy::dotenv().ok();

    let cli_args = cli::Cli::parse();

    let config = match cli::load_config(cli_args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_config = logging::LogConfig::new()
        .with_debug_mode(cli_args.debug)
        .with_level(config.logging.level.clone())
        .with_log_dir(config.logging.dir());

    let _guard = match logging::init_logging(log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let sources = cli::config_sources(cli_args.config.as_deref());
    if sources.is_empty() {
        tracing::debug!("No config file found, using defaults");
    }
    for path in &sources {
        tracing::info!("Loaded configuration from {:?}", path);
    }

    if cli_args.debug
        && let Ok(removed) =
            logging::cleanup_old_logs(&config.logging.dir(), config.logging.retention_days)
        && removed > 0
    {
        tracing::info!("Cleaned up {} old log file(s)", removed);
    }

    match cli::run(cli_args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<BotError>()
                .map_or(1, BotError::exit_code);
            tracing::error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
