//! Configuration resolution for the virology store.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/virology/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const WEEK_SECS: u64 = 7 * 24 * 60 * 60;

/// Complete virology store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub virology: VirologyConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// `SQLite` database file. `None` means the platform default location.
    pub database_path: Option<PathBuf>,
}

/// Retention and retry policy for test orders and results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirologyConfig {
    /// Extra attempts after the first when a generated order token collides.
    pub max_order_token_retries: u32,
    /// Lifetime of a freshly created order, its result and submission token.
    pub order_expiry_secs: u64,
    /// Retention of order and result once the result has been retrieved.
    pub test_data_retention_secs: u64,
    /// Retention of the submission token once the result has been retrieved.
    pub submission_data_retention_secs: u64,
    /// Number of successful CTA exchanges allowed per order.
    pub max_cta_exchange_count: u32,
}

impl Default for VirologyConfig {
    fn default() -> Self {
        Self {
            max_order_token_retries: 2,
            order_expiry_secs: 4 * WEEK_SECS,
            test_data_retention_secs: 4 * 60 * 60, // 4 hours
            submission_data_retention_secs: 4 * 24 * 60 * 60, // 4 days
            max_cta_exchange_count: 2,
        }
    }
}

/// Order token generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Regular expressions matched against the digit-normalised order token;
    /// a match discards the candidate.
    pub banned_word_patterns: Vec<String>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            banned_word_patterns: vec![
                "s[e3]x".to_string(),
                "f[a4]g".to_string(),
                "n[a4]z[i1]".to_string(),
                "k{3}".to_string(),
            ],
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(config_file: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    // Load global config
    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            let global = load_config_file(&global_path)?;
            merge_config(&mut config, global);
        }
    }

    // Load explicit config; unlike the global file it must exist
    if let Some(path) = config_file {
        let explicit = load_config_file(path)?;
        merge_config(&mut config, explicit);
    }

    // Apply environment overrides
    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("virology").join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("virology").join("virology.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: Config) {
    if overlay.store.database_path.is_some() {
        base.store.database_path = overlay.store.database_path;
    }
    base.virology = overlay.virology;
    base.tokens = overlay.tokens;
}

fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Ok(val) = std::env::var("VIROLOGY_DB_PATH") {
        config.store.database_path = Some(PathBuf::from(val));
    }
    if let Some(n) = env_number("VIROLOGY_MAX_ORDER_TOKEN_RETRIES")? {
        config.virology.max_order_token_retries = n;
    }
    if let Some(n) = env_number("VIROLOGY_TEST_DATA_RETENTION_SECS")? {
        config.virology.test_data_retention_secs = n;
    }
    if let Some(n) = env_number("VIROLOGY_SUBMISSION_DATA_RETENTION_SECS")? {
        config.virology.submission_data_retention_secs = n;
    }
    Ok(())
}

fn env_number<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got {val:?}"))),
        Err(_) => Ok(None),
    }
}
