//! Configuration snapshots recorded alongside each iteration's cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resolve::compute_sha256;
use super::{ConfigResolution, ConfigSource, RunConfig};
use crate::error::{Error, Result};

/// Snapshot of the effective run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Timestamp when snapshot was created
    pub snapshot_at: DateTime<Utc>,

    /// Hash of the effective (post-default) configuration
    pub effective_hash: String,

    /// Where the configuration came from
    pub source: SourceInfo,

    /// Active schema version
    pub schema_version: String,
}

impl ConfigSnapshot {
    /// Create a new snapshot from a loaded config.
    pub fn new(config: &RunConfig, source: ConfigSource) -> Result<Self> {
        let effective = serde_json::to_string(config)
            .map_err(|e| Error::InvalidConfig(format!("failed to serialize run config: {}", e)))?;

        Ok(ConfigSnapshot {
            snapshot_at: Utc::now(),
            effective_hash: compute_sha256(&effective),
            source: SourceInfo::from_config_source(source),
            schema_version: config.schema_version.clone(),
        })
    }

    /// Create a snapshot for built-in defaults.
    pub fn from_defaults(config: &RunConfig) -> Result<Self> {
        ConfigSnapshot::new(
            config,
            ConfigSource {
                path: None,
                hash: None,
                resolution: ConfigResolution::Default,
            },
        )
    }

    /// Return true if the config came from built-in defaults.
    pub fn is_default(&self) -> bool {
        self.source.resolution == "default"
    }

    /// Return the snapshot as a JSON value for cache inclusion.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "snapshot_at": self.snapshot_at.to_rfc3339(),
            "effective_hash": self.effective_hash,
            "source": {
                "path": self.source.path,
                "hash": self.source.hash,
                "resolution": self.source.resolution,
            },
            "schema_version": self.schema_version,
        })
    }
}

/// Source information for a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Path to the file (None if defaults)
    pub path: Option<String>,

    /// SHA-256 hash of file content (None if defaults)
    pub hash: Option<String>,

    /// How the config was resolved
    pub resolution: String,
}

impl SourceInfo {
    fn from_config_source(source: ConfigSource) -> Self {
        SourceInfo {
            path: source.path,
            hash: source.hash,
            resolution: source.resolution.to_string(),
        }
    }
}
