//! Client configuration.
//!
//! Transport and credential defaults can be kept in a TOML file and applied
//! to a client with [`QuotaClient::apply_config`](crate::QuotaClient::apply_config).
//!
//! ```toml
//! [rpc]
//! port = 0
//! use_tcp = true
//! timeout = "2s 500ms"
//!
//! [auth]
//! uid = 1000
//! gid = 1000
//! hostname = "workstation"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{RpcAuth, RpcPeer};

/// Errors loading a configuration or fixture file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    /// The file is not valid TOML for this schema
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings applied to a client before remote operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Transport for rquota calls
    pub rpc: RpcPeer,
    /// Credentials for rquota calls; untouched when absent
    pub auth: Option<RpcAuth>,
}

impl QuotaConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}
