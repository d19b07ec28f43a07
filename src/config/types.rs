//! Configuration types, defaults, loading, and validation.

use crate::campaign::LedgerSchema;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// WhatsApp session storage
    #[serde(default)]
    pub session: SessionConfig,

    /// Pairing page server
    #[serde(default)]
    pub server: ServerConfig,

    /// Invitation campaign files and ledger layout
    #[serde(default)]
    pub campaign: CampaignConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for debug-mode log files (default: ./logs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log files older than this are removed at startup
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_retention_days() -> u64 {
    7
}

impl LoggingConfig {
    pub fn dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("logs"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: None,
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Directory holding the session database
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Database file name without the `.db` extension
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

fn default_session_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_database_name() -> String {
    "sessions".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            database_name: default_database_name(),
        }
    }
}

impl SessionConfig {
    pub fn database_path(&self) -> PathBuf {
        self.dir.join(format!("{}.db", self.database_name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Do not open the pairing page in a browser
    #[serde(default)]
    pub stand_alone: bool,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            stand_alone: false,
        }
    }
}

/// Where the campaign's files live and how they are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    #[serde(default = "default_ledger")]
    pub ledger: PathBuf,

    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Directory of per-recipient PDFs
    #[serde(default = "default_attachment_dir")]
    pub attachment_dir: PathBuf,

    #[serde(default = "default_attachment_prefix")]
    pub attachment_prefix: String,

    #[serde(default = "default_attachment_suffix")]
    pub attachment_suffix: String,

    /// File name shown in the chat
    #[serde(default = "default_attachment_file_name")]
    pub attachment_file_name: String,

    #[serde(default = "default_attachment_mime")]
    pub attachment_mime: String,

    /// Preview image shared by every document; missing files are skipped
    #[serde(default = "default_thumbnail")]
    pub thumbnail: Option<PathBuf>,

    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,

    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,

    /// Delay between consecutive sends of a sweep
    #[serde(default = "default_pause_ms")]
    pub pause_between_sends_ms: u64,

    #[serde(default)]
    pub schema: LedgerSchema,
}

fn default_ledger() -> PathBuf {
    PathBuf::from("masivo/invitados.csv")
}

fn default_template() -> PathBuf {
    PathBuf::from("masivo/message.txt")
}

fn default_attachment_dir() -> PathBuf {
    PathBuf::from("masivo/invitaciones")
}

fn default_attachment_prefix() -> String {
    "invitaciones-".to_string()
}

fn default_attachment_suffix() -> String {
    ".pdf".to_string()
}

fn default_attachment_file_name() -> String {
    "invitacion.pdf".to_string()
}

fn default_attachment_mime() -> String {
    "application/pdf".to_string()
}

fn default_thumbnail() -> Option<PathBuf> {
    Some(PathBuf::from("masivo/thumbnail.jpeg"))
}

fn default_thumbnail_width() -> u32 {
    640
}

fn default_thumbnail_height() -> u32 {
    480
}

fn default_pause_ms() -> u64 {
    1000
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            ledger: default_ledger(),
            template: default_template(),
            attachment_dir: default_attachment_dir(),
            attachment_prefix: default_attachment_prefix(),
            attachment_suffix: default_attachment_suffix(),
            attachment_file_name: default_attachment_file_name(),
            attachment_mime: default_attachment_mime(),
            thumbnail: default_thumbnail(),
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
            pause_between_sends_ms: default_pause_ms(),
            schema: LedgerSchema::default(),
        }
    }
}

/// Environment variables that override file settings.
pub mod env {
    pub const LEDGER: &str = "INVITABOT_LEDGER";
    pub const TEMPLATE: &str = "INVITABOT_TEMPLATE";
    pub const ATTACHMENT_DIR: &str = "INVITABOT_ATTACHMENT_DIR";
    pub const SESSION_DIR: &str = "INVITABOT_SESSION_DIR";
    pub const PORT: &str = "INVITABOT_PORT";
    pub const LOG_LEVEL: &str = "INVITABOT_LOG_LEVEL";
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Priority (lowest to highest):
    /// 1. Default values
    /// 2. System config: ~/.config/invitabot/config.toml
    /// 3. Local config: ./invitabot.toml
    /// 4. Environment variables
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        for path in Self::layered_paths() {
            tracing::debug!("Loading config from: {:?}", path);
            config = Self::merge_from_file(config, &path)?;
        }
        Self::apply_env_overrides(config, |key| std::env::var(key).ok())
    }

    /// Config files `load` reads, lowest priority first. Missing files are left out.
    pub fn layered_paths() -> Vec<PathBuf> {
        Self::system_config_path()
            .into_iter()
            .chain(std::iter::once(Self::local_config_path()))
            .filter(|path| path.exists())
            .collect()
    }

    /// Load configuration from a specific file, then apply environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading configuration from custom path: {:?}", path);

        if !path.exists() {
            anyhow::bail!("Config file not found: {:?}", path);
        }
        let config = Self::merge_from_file(Self::default(), path)?;
        Self::apply_env_overrides(config, |key| std::env::var(key).ok())
    }

    pub fn system_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("invitabot").join("config.toml"))
    }

    pub fn local_config_path() -> PathBuf {
        PathBuf::from("./invitabot.toml")
    }

    /// Overlay the keys set in `path` onto `base`; keys the file leaves out
    /// keep their current value.
    fn merge_from_file(base: Self, path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let overlay: toml::Value = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        let mut merged = toml::Value::try_from(&base).context("Failed to serialize config")?;
        merge_values(&mut merged, overlay);
        merged
            .try_into()
            .with_context(|| format!("Invalid settings in config file: {:?}", path))
    }

    fn apply_env_overrides(
        mut config: Self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(path) = var(env::LEDGER) {
            config.campaign.ledger = PathBuf::from(path);
        }
        if let Some(path) = var(env::TEMPLATE) {
            config.campaign.template = PathBuf::from(path);
        }
        if let Some(path) = var(env::ATTACHMENT_DIR) {
            config.campaign.attachment_dir = PathBuf::from(path);
        }
        if let Some(path) = var(env::SESSION_DIR) {
            config.session.dir = PathBuf::from(path);
        }
        if let Some(port) = var(env::PORT) {
            config.server.port = port
                .parse()
                .with_context(|| format!("{} is not a valid port: {port}", env::PORT))?;
        }
        if let Some(level) = var(env::LOG_LEVEL) {
            config.logging.level = level;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        tracing::debug!("Validating configuration...");

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let schema = &self.campaign.schema;
        if schema.delimiter_byte().is_none() {
            anyhow::bail!("Ledger delimiter {:?} must be a single ASCII character", schema.delimiter);
        }
        if schema.sent_marker.trim().is_empty() {
            anyhow::bail!("Ledger sent marker must not be blank");
        }
        if schema.sent_marker == schema.pending_marker {
            anyhow::bail!(
                "Ledger pending and sent markers are both '{}'",
                schema.sent_marker
            );
        }

        if self.session.database_name.is_empty() {
            anyhow::bail!("Session database name must not be empty");
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        fs::write(path, toml_string)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Configuration saved to: {:?}", path);
        Ok(())
    }
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
