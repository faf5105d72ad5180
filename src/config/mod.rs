//! Configuration for trice-rs
//!
//! One TOML file with an `[id]` and a `[log]` section, see [`settings`].
//! Command line flags override what the file says.
//!
//! # Resolution Order
//!
//! The first of these that exists is used:
//!
//! 1. `--config <path>`
//! 2. `$TRICE_CONFIG`
//! 3. `trice.toml` in the working directory
//! 4. the platform config directory:
//!    - **Linux**: `~/.config/dev.trice-rs/trice.toml`
//!    - **macOS**: `~/Library/Application Support/dev.trice-rs/trice.toml`
//!    - **Windows**: `%APPDATA%\dev.trice-rs\trice.toml`
//! 5. built-in defaults
//!
//! An explicitly named file that does not exist is an error. A file found
//! through steps 2 to 4 that fails to parse is reported with a warning by
//! [`TriceConfig::load_or_default`], which then falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [id]
//! min = 1000
//! max = 7999
//! sources = ["src", "lib"]
//!
//! [log]
//! endianness = "big"
//! password = "MySecret"
//! timestamp = "UTCmicro"
//! ```

pub mod settings;

pub use settings::*;

use crate::decoder::{FramerConfig, Xtea};
use crate::emitter::TimestampFormat;
use crate::error::{Result, TriceError};
use crate::id::SyncOptions;
use crate::pipeline::PipelineOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for the config directory
pub const APP_ID: &str = "dev.trice-rs";

/// Config file name
pub const CONFIG_FILE: &str = "trice.toml";

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "TRICE_CONFIG";

/// Path of the per-user config file
pub fn user_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

/// Locate the config file to use, `None` means built-in defaults
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(path));
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|p| p.is_file())
}

// ==================== Trice Config ====================

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriceConfig {
    /// ID registry settings
    pub id: IdSettings,

    /// Decoder settings
    pub log: LogSettings,
}

impl TriceConfig {
    /// Parse TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TriceError::Config(format!("Invalid config: {}", e)))
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TriceError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| e.with_context(format!("loading {}", path.display())))?;
        config.validate()?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Resolve and load the config file.
    ///
    /// A file named with `--config` must load. Anything found implicitly
    /// falls back to defaults on error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match (explicit, resolve_config_path(explicit)) {
            (Some(path), _) => Self::load(path),
            (None, Some(path)) => Ok(Self::load(&path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            })),
            (None, None) => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Write the config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TriceError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| TriceError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            TriceError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check value combinations serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.id.range().validate().map_err(TriceError::Config)?;
        let wire_max = self.id.wire_max().ok_or_else(|| {
            TriceError::Config(format!("id_bits must be 16 or 32, not {}", self.id.id_bits))
        })?;
        if self.id.max > wire_max {
            return Err(TriceError::Config(format!(
                "ID max {} does not fit a {}-bit wire ID",
                self.id.max, self.id.id_bits
            )));
        }
        if self.id.sources.is_empty() {
            return Err(TriceError::Config("no source trees configured".to_string()));
        }
        if self.log.chunk_size == 0 || self.log.channel_capacity == 0 {
            return Err(TriceError::Config(
                "chunk_size and channel_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    // ==================== Conversions ====================

    /// Options for one synchronization pass
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            range: self.id.range(),
            policy: self.id.policy,
            til: self.id.til.clone(),
            li: self.id.li.clone(),
            dry_run: self.id.dry_run,
            share_rewrite: self.id.share_rewrite,
        }
    }

    /// Framer settings, with the cipher derived from the pass-phrase
    pub fn framer_config(&self) -> FramerConfig {
        FramerConfig {
            format: self.log.encoding,
            endianness: self.log.endianness,
            cipher: Xtea::from_passphrase(&self.log.password),
        }
    }

    pub fn timestamp_format(&self) -> TimestampFormat {
        TimestampFormat::parse(&self.log.timestamp)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            channel_capacity: self.log.channel_capacity,
            chunk_size: self.log.chunk_size,
            target_stamp: self.log.target_stamp,
        }
    }
}
