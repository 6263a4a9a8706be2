//! Configuration for the staking engine
//!
//! Two layers, as everywhere else in this workspace: a serde-backed
//! `FileConfig` mirroring config.toml, and a parsed runtime `Config`
//! the engine consumes. Epoch duration and genesis are deployment
//! constants; changing them after accounts exist would reinterpret
//! every stored activation epoch.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::constants;
use crate::epochs::EpochClock;

// =============================================================================
// File-based Configuration (config.toml)
// =============================================================================

/// Configuration loaded from config.toml
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub staking: StakingConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Epoch parameters for the lock state machine
#[derive(Debug, Clone, Deserialize)]
pub struct StakingConfig {
    /// Epoch length in seconds (default: 3600)
    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: i64,
    /// Unix timestamp where epoch 0 begins (default: 0)
    #[serde(default = "default_genesis")]
    pub genesis_timestamp: i64,
}

/// SQLite storage location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

fn default_epoch_duration() -> i64 {
    constants::DEFAULT_EPOCH_DURATION_SECS
}

fn default_genesis() -> i64 {
    constants::DEFAULT_GENESIS_TIMESTAMP
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content).context(
            "Failed to parse config.toml. Check for missing [staking] section, \
             invalid TOML syntax, or incorrect data types.",
        )
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Parsed runtime configuration
pub struct Config {
    pub clock: EpochClock,
    /// Where the SQLite store lives, when one is used
    pub database_path: Option<PathBuf>,
}

impl Config {
    pub fn from_file(file_config: &FileConfig) -> Result<Self> {
        let staking = &file_config.staking;
        if staking.epoch_duration_secs <= 0 {
            anyhow::bail!("staking.epoch_duration_secs must be positive");
        }

        Ok(Self {
            clock: EpochClock::new(staking.genesis_timestamp, staking.epoch_duration_secs),
            database_path: file_config.database.as_ref().map(|db| PathBuf::from(&db.path)),
        })
    }
}
