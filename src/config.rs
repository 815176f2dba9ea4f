//! Regulator configuration
//!
//! Read from an optional TOML file; every section falls back to defaults.
//! Command line flags are applied on top by the CLI.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::exec::RemoteTarget;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exec: ExecConfig,
    pub remote: RemoteConfig,
    pub log: LogConfig,
    pub catalogue: CatalogueConfig,
}

/// Local process execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Seconds a command may run before it is killed
    pub timeout_secs: u64,

    /// Interpreter for the built-in default implements
    pub shell: String,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            shell: default_shell(),
        }
    }
}

impl ExecConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Remote execution over ssh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Run everything on this host when set
    pub host: Option<String>,

    pub user: String,

    pub port: u16,

    pub ssh_binary: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: default_user(),
            port: default_ssh_port(),
            ssh_binary: "ssh".to_string(),
        }
    }
}

impl RemoteConfig {
    /// The remote target, if a host is configured
    pub fn target(&self) -> Option<RemoteTarget> {
        self.host
            .as_ref()
            .filter(|h| !h.is_empty())
            .map(|host| RemoteTarget {
                user: self.user.clone(),
                host: host.clone(),
                port: self.port,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogueConfig {
    /// Documents merged before any given on the command line
    pub files: Vec<PathBuf>,
}

impl Config {
    /// Load `path`, or defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }
}

// Defaults
fn default_timeout_secs() -> u64 { 300 }
fn default_shell() -> String { "sh".to_string() }
fn default_ssh_port() -> u16 { 22 }
fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "root".to_string())
}
