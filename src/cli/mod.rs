//! CLI Module
//!
//! Command-line interface for invitabot using Clap v4.

mod commands;
mod session;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use commands::{cmd_init, cmd_logs, cmd_preview, cmd_status};

pub use commands::{config_sources, load_config};

/// invitabot - WhatsApp invitation campaign agent
#[derive(Parser, Debug)]
#[command(name = "invitabot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug mode (writes JSON log files to ./logs)
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pair or reconnect the account and answer chat commands
    Run {
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Like `run`, plus one production sweep over the ledger once connected
    Sweep {
        #[command(flatten)]
        connect: ConnectArgs,
    },

    /// Show ledger delivery counts
    Status,

    /// Render one row's message without sending it
    Preview {
        /// 1-based ledger row
        #[arg(short, long)]
        row: usize,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Log management operations
    Logs {
        #[command(subcommand)]
        operation: LogCommands,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Phone number of the account to pair, digits only (e.g. 5215512345678)
    pub phone: String,

    /// Port for the pairing page
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Session database name (without extension)
    #[arg(long = "db", alias = "database-name")]
    pub database_name: Option<String>,

    /// Do not open the pairing page in a browser
    #[arg(short, long)]
    pub stand_alone: bool,
}

impl ConnectArgs {
    /// Flags win over every configuration layer.
    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(name) = &self.database_name {
            config.session.database_name = name.clone();
        }
        if self.stand_alone {
            config.server.stand_alone = true;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum LogCommands {
    /// Show log file location and status
    Status,
    /// Clean up old log files
    Clean {
        /// Maximum age in days (default: 7)
        #[arg(short = 'a', long, default_value = "7")]
        days: u64,
    },
}

/// Main CLI entry point
pub async fn run(cli: Cli, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Run { connect } => {
            connect.apply(&mut config);
            session::cmd_connect(&config, &connect.phone, false).await
        }
        Commands::Sweep { connect } => {
            connect.apply(&mut config);
            session::cmd_connect(&config, &connect.phone, true).await
        }
        Commands::Status => cmd_status(&config),
        Commands::Preview { row } => cmd_preview(&config, row),
        Commands::Init { force } => cmd_init(force),
        Commands::Logs { operation } => cmd_logs(&config, operation),
    }
}
