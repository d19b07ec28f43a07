//! Offline subcommands (status, preview, init, logs) and config loading.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use super::LogCommands;
use crate::campaign::CampaignEngine;
use crate::channels::OfflineMessenger;
use crate::config::Config;
use crate::logging;

/// Load configuration from file or defaults
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    config.validate()?;
    Ok(config)
}

/// Files `load_config` reads for `config_path`, lowest priority first.
///
/// Config is loaded before logging is up, so `main` reports these afterwards.
pub fn config_sources(config_path: Option<&str>) -> Vec<PathBuf> {
    match config_path {
        Some(path) => vec![PathBuf::from(path)],
        None => Config::layered_paths(),
    }
}

fn offline_engine(config: &Config) -> CampaignEngine {
    CampaignEngine::new(Arc::new(OfflineMessenger), config.campaign.clone())
}

pub(crate) fn cmd_status(config: &Config) -> Result<()> {
    let summary = offline_engine(config)
        .summary()
        .context("Failed to read the campaign ledger")?;

    println!("Ledger: {}", config.campaign.ledger.display());
    println!("{summary}");
    if summary.pending == 0 && summary.unrecognized == 0 {
        println!("Nothing left to send.");
    }
    Ok(())
}

pub(crate) fn cmd_preview(config: &Config, row: usize) -> Result<()> {
    let preview = offline_engine(config)
        .preview(row)
        .with_context(|| format!("Failed to preview row {row}"))?;

    println!("Row:        {}", preview.row);
    println!("Recipient:  {}", preview.recipient);
    println!(
        "Attachment: {}{}",
        preview.attachment.display(),
        if preview.attachment_exists { "" } else { " (missing)" }
    );
    if !preview.unknown_placeholders.is_empty() {
        println!(
            "Unknown placeholders (left as-is): {}",
            preview.unknown_placeholders.join(", ")
        );
    }
    println!("\n{}", preview.caption);
    Ok(())
}

/// Initialize configuration file
pub(crate) fn cmd_init(force: bool) -> Result<()> {
    let config_path =
        Config::system_config_path().context("Could not determine config directory")?;

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at: {}\nUse --force to overwrite",
            config_path.display()
        );
    }

    Config::default().save(&config_path)?;

    println!("Configuration initialized at: {}", config_path.display());
    println!("\nNext steps:");
    println!("   1. Point [campaign] at your ledger, template and invitation PDFs");
    println!("   2. Run 'invitabot status' to check the ledger");
    println!("   3. Run 'invitabot run <PHONE>' and scan the QR code");

    Ok(())
}

pub(crate) fn cmd_logs(config: &Config, operation: LogCommands) -> Result<()> {
    let log_dir = config.logging.dir();

    match operation {
        LogCommands::Status => {
            println!("Log directory: {}", log_dir.display());
            let logs = logging::list_logs(&log_dir)?;
            if logs.is_empty() {
                println!("Status: no logs found");
            } else {
                let total: u64 = logs.iter().map(|(_, size)| size).sum();
                println!("Log files: {}", logs.len());
                println!("Total size: {:.2} MB", total as f64 / (1024.0 * 1024.0));
                println!("Latest log: {}", logs[0].0.display());
            }
            println!("Today's log: {}", logging::get_log_path(&log_dir).display());
            println!("\nRun with -d to write debug logs.");
            Ok(())
        }
        LogCommands::Clean { days } => {
            println!("Cleaning up log files older than {} days...", days);
            let removed = logging::cleanup_old_logs(&log_dir, days)?;
            if removed > 0 {
                println!("Removed {} old log file(s)", removed);
            } else {
                println!("No old log files to remove");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn campaign_config(dir: &TempDir) -> Config {
        std::fs::write(
            dir.path().join("invitados.csv"),
            "id,name,guests,phone,table,status\n1,Ana,2,521234,A,pendiente\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("message.txt"), "Hola {{name}}").unwrap();
        let mut config = Config::default();
        config.campaign.ledger = dir.path().join("invitados.csv");
        config.campaign.template = dir.path().join("message.txt");
        config.campaign.attachment_dir = dir.path().join("invitaciones");
        config.logging.log_dir = Some(dir.path().join("logs"));
        config
    }

    #[test]
    fn test_status_and_preview_read_local_files() {
        let dir = TempDir::new().unwrap();
        let config = campaign_config(&dir);
        cmd_status(&config).unwrap();
        cmd_preview(&config, 1).unwrap();
        assert!(cmd_preview(&config, 2).is_err());
    }

    #[test]
    fn test_status_missing_ledger() {
        let mut config = Config::default();
        config.campaign.ledger = PathBuf::from("/nonexistent/invitados.csv");
        assert!(cmd_status(&config).is_err());
    }

    #[test]
    fn test_logs_without_directory() {
        let dir = TempDir::new().unwrap();
        let config = campaign_config(&dir);
        cmd_logs(&config, LogCommands::Status).unwrap();
        cmd_logs(&config, LogCommands::Clean { days: 7 }).unwrap();
    }

    #[test]
    fn test_load_missing_custom_config() {
        assert!(load_config(Some("/nonexistent/invitabot.toml")).is_err());
    }

    #[test]
    fn test_custom_config_is_the_only_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("invitabot.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();
        let path = path.to_string_lossy().to_string();

        assert_eq!(config_sources(Some(&path)), vec![PathBuf::from(&path)]);
        assert_eq!(load_config(Some(&path)).unwrap().server.port, 9000);
    }

    #[test]
    fn test_default_sources_exist() {
        assert!(config_sources(None).iter().all(|path| path.exists()));
    }
}
