//! Configuration resolution for calibtool.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit path (`config_file`, then `config_dir`)
//! 2. `CALIBTOOL_CONFIG` environment variable
//! 3. `$XDG_CONFIG_HOME/calibtool/`
//! 4. Platform config dir (`~/.config/calibtool/`)
//! 5. Built-in defaults

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::{ConfigResolution, ConfigSource, RunConfig};
use crate::error::{Error, Result};

/// Environment variable naming an explicit run-config file.
pub const CONFIG_ENV: &str = "CALIBTOOL_CONFIG";

/// File names looked up inside a config directory, in order.
pub const CONFIG_FILE_NAMES: [&str; 2] = ["calibtool.toml", "calibtool.json"];

const APP_DIR: &str = "calibtool";

/// Configuration file paths.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Explicit path to the run-config file
    pub config_file: Option<PathBuf>,
    /// Directory containing calibtool.toml
    pub config_dir: Option<PathBuf>,
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    cli_paths: ConfigPaths,
}

impl ConfigResolver {
    /// Create a new resolver with explicit paths.
    pub fn new(paths: ConfigPaths) -> Self {
        ConfigResolver { cli_paths: paths }
    }

    /// Create a resolver with no explicit overrides.
    pub fn with_defaults() -> Self {
        ConfigResolver::default()
    }

    /// Resolve the run-config file path.
    pub fn resolve_run_config_path(&self) -> (Option<PathBuf>, ConfigResolution) {
        // 1. Explicit file, then explicit directory
        if let Some(ref path) = self.cli_paths.config_file {
            return (Some(path.clone()), ConfigResolution::CliFlag);
        }
        if let Some(ref dir) = self.cli_paths.config_dir {
            return match find_in_dir(dir) {
                Some(path) => (Some(path), ConfigResolution::CliFlag),
                None => (None, ConfigResolution::Default),
            };
        }

        // 2. CALIBTOOL_CONFIG env var
        if let Ok(path) = env::var(CONFIG_ENV) {
            if !path.is_empty() {
                return (Some(PathBuf::from(path)), ConfigResolution::EnvVar);
            }
        }

        // 3. XDG_CONFIG_HOME/calibtool
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            if let Some(path) = find_in_dir(&PathBuf::from(xdg).join(APP_DIR)) {
                return (Some(path), ConfigResolution::XdgConfig);
            }
        }

        // 4. Platform config dir
        if let Some(path) = dirs::config_dir().and_then(|d| find_in_dir(&d.join(APP_DIR))) {
            return (Some(path), ConfigResolution::XdgConfig);
        }

        // 5. Default
        (None, ConfigResolution::Default)
    }

    /// Load the run configuration from the resolved path or defaults.
    pub fn load_run_config(&self) -> Result<(RunConfig, ConfigSource)> {
        let (path, resolution) = self.resolve_run_config_path();

        match path {
            Some(p) => {
                let content = fs::read_to_string(&p).map_err(|e| {
                    Error::InvalidConfig(format!(
                        "failed to read run config from {}: {}",
                        p.display(),
                        e
                    ))
                })?;

                let hash = compute_sha256(&content);

                let config = RunConfig::parse_for_path(&p, &content).map_err(|e| {
                    Error::InvalidConfig(format!("failed to parse {}: {}", p.display(), e))
                })?;

                config.validate()?;

                Ok((
                    config,
                    ConfigSource {
                        path: Some(p.to_string_lossy().to_string()),
                        hash: Some(hash),
                        resolution,
                    },
                ))
            }
            None => Ok((
                RunConfig::default(),
                ConfigSource {
                    path: None,
                    hash: None,
                    resolution: ConfigResolution::Default,
                },
            )),
        }
    }
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Compute SHA-256 hash of a string.
pub(crate) fn compute_sha256(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_dir_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ConfigResolver::new(ConfigPaths {
            config_file: None,
            config_dir: Some(dir.path().to_path_buf()),
        });
        let (config, source) = resolver.load_run_config().unwrap();
        assert_eq!(source.resolution, ConfigResolution::Default);
        assert!(source.path.is_none());
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_config_dir_prefers_toml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("calibtool.toml"), "max_threads = 3\n").unwrap();
        fs::write(dir.path().join("calibtool.json"), r#"{"max_threads": 9}"#).unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_file: None,
            config_dir: Some(dir.path().to_path_buf()),
        });
        let (config, source) = resolver.load_run_config().unwrap();
        assert_eq!(config.max_threads, 3);
        assert_eq!(source.resolution, ConfigResolution::CliFlag);
    }

    #[test]
    fn test_sha256_hash() {
        let hash = compute_sha256("test content");
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut tmp = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        tmp.write_all(b"max_threads = 8\n[cache]\nenabled = false\n")
            .unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_file: Some(tmp.path().to_path_buf()),
            config_dir: None,
        });

        let (config, source) = resolver.load_run_config().unwrap();
        assert_eq!(source.resolution, ConfigResolution::CliFlag);
        assert!(source.hash.is_some());
        assert_eq!(config.max_threads, 8);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let mut tmp = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        tmp.write_all(b"max_threads = 0\n").unwrap();

        let resolver = ConfigResolver::new(ConfigPaths {
            config_file: Some(tmp.path().to_path_buf()),
            config_dir: None,
        });
        let err = resolver.load_run_config().unwrap_err();
        assert_eq!(err.code(), 12);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let resolver = ConfigResolver::new(ConfigPaths {
            config_file: Some(PathBuf::from("/nonexistent/calibtool.toml")),
            config_dir: None,
        });
        assert!(resolver.load_run_config().is_err());
    }
}
