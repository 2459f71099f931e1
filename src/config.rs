//! Studio configuration
//!
//! Values that shape how files are read and written and how performances are
//! chunked for chat transfer. Loaded from YAML; every field has a default so
//! a partial file is fine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, StudioError};

/// Default ticks per quarter note; every loaded track is rescaled to this
pub const DEFAULT_RESOLUTION: u16 = 480;

/// Vendor marker text written at tick 0 of the first track
pub const DEFAULT_SIGNATURE: &str = "MidiStudio";

/// Characters per chat block
pub const DEFAULT_BLOCK_SIZE: usize = 500;

pub const DEFAULT_BLOCK_PREFIX: &str = "MIDI:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub default_resolution: u16,
    pub signature: String,
    pub version: String,
    pub block_size: usize,
    pub block_prefix: String,
    pub log_level: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            default_resolution: DEFAULT_RESOLUTION,
            signature: DEFAULT_SIGNATURE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            block_size: DEFAULT_BLOCK_SIZE,
            block_prefix: DEFAULT_BLOCK_PREFIX.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl StudioConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: StudioConfig = serde_yaml::from_str(content)
            .map_err(|e| StudioError::Config(format!("Failed to parse config as YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| StudioError::Config(format!("Failed to serialize config: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.default_resolution == 0 || self.default_resolution > 0x7FFF {
            return Err(StudioError::Config(format!(
                "default_resolution must be within 1..=32767, got {}",
                self.default_resolution
            )));
        }
        if self.block_size == 0 {
            return Err(StudioError::Config("block_size must be positive".to_string()));
        }
        if self.signature.is_empty() {
            return Err(StudioError::Config("signature must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn log_level(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Install an `env_logger` backend at the configured level. Does nothing if
/// a logger is already installed.
pub fn init_logging(config: &StudioConfig) {
    let result = env_logger::Builder::new()
        .filter_level(config.log_level())
        .format_timestamp_millis()
        .try_init();
    if result.is_ok() {
        log::info!("MIDI studio core {} logging at {}", config.version, config.log_level());
    }
}
