//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.perch/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.
//! The bearer token is deliberately *not* a config-file option; it is read
//! from the `PERCH_TOKEN` environment variable only.

use log::{info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;

pub const TOKEN_ENV: &str = "PERCH_TOKEN";
pub const BASE_URL_ENV: &str = "PERCH_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://slack.com";

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PerchConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub db_path: Option<PathBuf>,
    /// One of error/warn/info/debug/trace.
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub base_url: Option<String>,
    /// Clear the per-conversation fetched flag when a history fetch fails,
    /// making the fetch eligible to run again on the next selection change.
    /// Off by default: the original behavior is fetch-at-most-once.
    pub retry_failed_history: Option<bool>,
}

/// Settings taken from the command line; `None` means "not given".
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub db_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub log_level: Option<String>,
    pub retry_failed_history: bool,
}

/// Settings taken from the environment.
#[derive(Debug, Default)]
pub struct EnvOverrides {
    pub token: Option<String>,
    pub base_url: Option<String>,
}

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub token: Option<String>,
    pub base_url: String,
    pub db_path: PathBuf,
    pub log_level: LevelFilter,
    pub retry_failed_history: bool,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.perch/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".perch").join("config.toml"))
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("perch").join("perch.db"))
        .unwrap_or_else(|| PathBuf::from("perch.db"))
}

/// Load config from `~/.perch/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and returns
/// `PerchConfig::default()`. If it exists but is malformed, returns
/// `ConfigError::Parse`.
pub fn load_config() -> Result<PerchConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(PerchConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(PerchConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: PerchConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn generate_default_config(path: &std::path::Path) {
    let template = format!(
        "# perch configuration\n\
         # The bearer token is read from the {TOKEN_ENV} environment variable.\n\
         \n\
         [general]\n\
         # db_path = \"{}\"\n\
         # log_level = \"info\"\n\
         \n\
         [network]\n\
         # base_url = \"{DEFAULT_BASE_URL}\"\n\
         # retry_failed_history = false\n",
        default_db_path().display()
    );
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Could not create config directory: {e}");
            return;
        }
    }
    if let Err(e) = fs::write(path, template) {
        warn!("Could not write default config: {e}");
    }
}

fn parse_level(name: &str) -> LevelFilter {
    match name {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Resolve the effective configuration from explicit inputs.
/// Precedence: CLI > env > file > default.
pub fn resolve_with(cli: CliOverrides, file: PerchConfig, env: EnvOverrides) -> Config {
    let base_url = cli
        .base_url
        .or(env.base_url)
        .or(file.network.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let db_path = cli
        .db_path
        .or(file.general.db_path)
        .unwrap_or_else(default_db_path);
    let log_level = cli
        .log_level
        .or(file.general.log_level)
        .map(|name| parse_level(&name))
        .unwrap_or(LevelFilter::Info);
    let retry_failed_history =
        cli.retry_failed_history || file.network.retry_failed_history.unwrap_or(false);

    Config {
        token: env.token,
        base_url,
        db_path,
        log_level,
        retry_failed_history,
    }
}

/// Resolve the effective configuration, reading the config file and the
/// process environment.
pub fn resolve(cli: CliOverrides) -> Result<Config, ConfigError> {
    let file = load_config()?;
    let env = EnvOverrides {
        token: std::env::var(TOKEN_ENV).ok(),
        base_url: std::env::var(BASE_URL_ENV).ok(),
    };
    Ok(resolve_with(cli, file, env))
}

#[cfg(test)]
impl Config {
    /// A config with no token: network spawns become no-ops.
    pub fn offline() -> Self {
        Config {
            token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: PathBuf::from(":memory:"),
            log_level: LevelFilter::Info,
            retry_failed_history: false,
        }
    }
}
