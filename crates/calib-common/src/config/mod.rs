//! Run configuration loading and validation for calibtool.
//!
//! This module provides:
//! - The typed `RunConfig` (worker pool, cache location, log defaults)
//! - Deterministic config resolution (explicit > env > XDG > defaults)
//! - Config snapshots recorded with each iteration

pub mod resolve;
pub mod run;
pub mod snapshot;

pub use resolve::{ConfigPaths, ConfigResolver};
pub use run::{CacheSettings, RunConfig};
pub use snapshot::ConfigSnapshot;

use crate::error::Result;

/// The loaded run configuration together with its provenance.
#[derive(Debug, Clone)]
pub struct Config {
    pub run: RunConfig,
    /// Metadata about how this config was loaded
    pub snapshot: ConfigSnapshot,
}

impl Config {
    /// Load configuration with resolution from explicit paths, env, or defaults.
    pub fn load(resolver: &ConfigResolver) -> Result<Self> {
        let (run, source) = resolver.load_run_config()?;
        let snapshot = ConfigSnapshot::new(&run, source)?;
        Ok(Config { run, snapshot })
    }

    /// Load configuration with built-in defaults only.
    pub fn load_defaults() -> Result<Self> {
        let run = RunConfig::default();
        let snapshot = ConfigSnapshot::from_defaults(&run)?;
        Ok(Config { run, snapshot })
    }
}

/// Configuration source for a file.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file, or None if using defaults
    pub path: Option<String>,
    /// SHA-256 hash of file contents, or None if defaults
    pub hash: Option<String>,
    /// How this source was resolved
    pub resolution: ConfigResolution,
}

/// How a config file was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigResolution {
    /// From an explicit path
    CliFlag,
    /// From environment variable
    EnvVar,
    /// From XDG config directory
    XdgConfig,
    /// Using built-in defaults
    Default,
}

impl std::fmt::Display for ConfigResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigResolution::CliFlag => write!(f, "cli"),
            ConfigResolution::EnvVar => write!(f, "env"),
            ConfigResolution::XdgConfig => write!(f, "xdg"),
            ConfigResolution::Default => write!(f, "default"),
        }
    }
}
