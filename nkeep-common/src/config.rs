//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `NKEEP_ROOT` environment variable
//! 3. `root_folder` in the TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file never aborts startup: defaults are
//! used and a warning is logged.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ENV_ROOT: &str = "NKEEP_ROOT";

/// Upper bound on concurrent detail fetches during sync
pub const MAX_SYNC_CONCURRENCY: usize = 3;

/// Default HTTP bind address
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5730";

/// Top-level TOML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding the library, listing snapshot and database
    pub root_folder: Option<PathBuf>,
    /// Address the HTTP API binds to
    pub bind_address: String,
    pub logging: LoggingConfig,
    pub sync: SyncConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            logging: LoggingConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing level; `RUST_LOG` takes precedence
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Sync section: pacing and collaborator endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Concurrent detail fetches (clamped to 1..=3)
    pub max_concurrency: usize,
    /// Minimum interval between detail-fetch starts
    pub request_interval_ms: u64,
    /// Delay between media downloads of one note
    pub media_interval_ms: u64,
    /// Base URL of the detail-fetch collaborator
    pub detail_endpoint: Option<String>,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            request_interval_ms: 2000,
            media_interval_ms: 500,
            detail_endpoint: None,
            user_agent: concat!("NoteKeep/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Worker count actually used by the reconciler
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, MAX_SYNC_CONCURRENCY)
    }
}

/// Default config file location (`~/.config/nkeep/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nkeep").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load the config file if present, otherwise fall back to defaults
pub fn load_or_default(path: Option<&Path>) -> TomlConfig {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("Could not determine config directory, using defaults");
            return TomlConfig::default();
        }
    };

    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    match load_toml_config(&path) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} - using defaults", e);
            TomlConfig::default()
        }
    }
}

/// Write config atomically (temp file in the same directory, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize config failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("nkeep"))
        .unwrap_or_else(|| PathBuf::from("./nkeep_data"))
}

/// Resolves the root folder from CLI, environment, TOML and defaults
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>, config: &TomlConfig) -> Self {
        Self {
            cli_arg,
            toml_root: config.root_folder.clone(),
        }
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ENV_ROOT) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder()
    }
}

/// Creates and names the pieces of the root folder layout
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create root and library directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(self.library_path())
            .map_err(|e| Error::io_context("create", self.library_path().display(), e))?;
        Ok(())
    }

    /// One directory per album lives here
    pub fn library_path(&self) -> PathBuf {
        self.root.join("library")
    }

    /// Most recent remote listing snapshot
    pub fn listing_path(&self) -> PathBuf {
        self.root.join("listing.json")
    }

    /// SQLite file for album registry, copy links and status overlay
    pub fn database_path(&self) -> PathBuf {
        self.root.join("vault.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_concurrency_is_clamped() {
        let mut sync = SyncConfig::default();
        assert_eq!(sync.effective_concurrency(), 2);

        sync.max_concurrency = 0;
        assert_eq!(sync.effective_concurrency(), 1);

        sync.max_concurrency = 16;
        assert_eq!(sync.effective_concurrency(), MAX_SYNC_CONCURRENCY);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            root_folder = "/data/nkeep"

            [sync]
            max_concurrency = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.root_folder, Some(PathBuf::from("/data/nkeep")));
        assert_eq!(config.sync.max_concurrency, 3);
        assert_eq!(config.sync.request_interval_ms, 2000);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_initializer_layout() {
        let init = RootFolderInitializer::new(PathBuf::from("/r"));
        assert_eq!(init.library_path(), PathBuf::from("/r/library"));
        assert_eq!(init.listing_path(), PathBuf::from("/r/listing.json"));
        assert_eq!(init.database_path(), PathBuf::from("/r/vault.db"));
    }
}
