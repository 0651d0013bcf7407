//! Configuration file support for the fsquota CLI.
//!
//! Configuration is read from `$FSQUOTA_CONFIG_DIR/config.toml` when the
//! variable is set, otherwise from `~/.config/fsquota/config.toml` (XDG) or
//! `~/Library/Application Support/fsquota/config.toml` on macOS. A missing
//! file means defaults.
//!
//! # Example configuration
//!
//! ```toml
//! [defaults]
//! json = false
//!
//! [rpc]
//! port = 0
//! use_tcp = true
//! timeout = "2s"
//!
//! [auth]
//! uid = 1000
//! hostname = "workstation"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use fsquota::{QuotaConfig, RpcPeer};
use serde::Deserialize;

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "FSQUOTA_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Output defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Remote transport and credentials
    #[serde(flatten)]
    pub quota: QuotaConfig,
}

/// Default settings applied to all commands
#[derive(Debug, Default, Deserialize)]
pub struct Defaults {
    /// Print JSON instead of tables
    #[serde(default)]
    pub json: bool,
}

/// Command-line overrides for the RPC transport
#[derive(Debug, Clone, Copy, Default)]
pub struct RpcOverrides {
    pub port: Option<u16>,
    pub tcp: bool,
    pub timeout: Option<Duration>,
}

impl Config {
    /// Load configuration from the default path, or return defaults if not found.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Quota configuration with command-line overrides applied.
    pub fn quota_with(&self, overrides: RpcOverrides) -> QuotaConfig {
        let mut quota = self.quota.clone();
        let RpcPeer {
            port,
            use_tcp,
            timeout,
        } = quota.rpc;
        quota.rpc = RpcPeer {
            port: overrides.port.unwrap_or(port),
            use_tcp: overrides.tcp || use_tcp,
            timeout: overrides.timeout.unwrap_or(timeout),
        };
        quota
    }
}

/// Get the path to the configuration file.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }

    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(base_dirs.config_dir().join("fsquota").join("config.toml"))
}
