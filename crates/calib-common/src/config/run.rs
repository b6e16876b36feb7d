//! Run configuration for a calibration iteration.
//!
//! Loaded from `calibtool.toml` (or `.json`). Every field has a default so
//! an empty file, or no file at all, is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version for run configuration.
pub const RUN_CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Default size of the worker pool used for the `apply` fan-out.
pub const DEFAULT_MAX_THREADS: usize = 16;

/// Root run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Schema version for compatibility checking
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Number of workers extracting observations in parallel
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Per-iteration visualization cache
    #[serde(default)]
    pub cache: CacheSettings,

    /// Default log level when neither CLI nor environment sets one
    #[serde(default)]
    pub log_level: Option<String>,

    /// Default log format (`human` or `jsonl`)
    #[serde(default)]
    pub log_format: Option<String>,
}

fn default_schema_version() -> String {
    RUN_CONFIG_SCHEMA_VERSION.to_string()
}

fn default_max_threads() -> usize {
    DEFAULT_MAX_THREADS
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            schema_version: default_schema_version(),
            max_threads: DEFAULT_MAX_THREADS,
            cache: CacheSettings::default(),
            log_level: None,
            log_format: None,
        }
    }
}

impl RunConfig {
    /// Parse from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Parse from JSON text.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parse `content` according to the extension of `path` (`.json` or TOML).
    pub fn parse_for_path(path: &Path, content: &str) -> Result<Self> {
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(content)
        } else {
            Self::from_toml_str(content)
        }
    }

    /// Validate configuration semantically.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != RUN_CONFIG_SCHEMA_VERSION {
            return Err(Error::InvalidConfig(format!(
                "schema version mismatch: expected {}, got {}",
                RUN_CONFIG_SCHEMA_VERSION, self.schema_version
            )));
        }
        if self.max_threads == 0 {
            return Err(Error::InvalidConfig(
                "max_threads must be at least 1".to_string(),
            ));
        }
        if let Some(format) = &self.log_format {
            if !matches!(format.to_ascii_lowercase().as_str(), "human" | "jsonl" | "json") {
                return Err(Error::InvalidConfig(format!(
                    "log_format must be 'human' or 'jsonl' (got '{}')",
                    format
                )));
            }
        }
        self.cache.validate()?;
        Ok(())
    }
}

/// Where and whether the visualization cache is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSettings {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Output file; when unset the caller decides.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            path: None,
        }
    }
}

impl CacheSettings {
    pub fn validate(&self) -> Result<()> {
        if let Some(path) = &self.path {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig("cache.path must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
