use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::compile::{COMPILE_RPC_ID, EXECUTE_RPC_ID};
use crate::element::ELEMENT_RPC_ID;
use crate::provision::{COMPILE_HANDLER, HELPER_NAME};
use crate::transport::ConnectOptions;

/// Name of the per-project configuration file
pub const CONFIG_FILE_NAME: &str = "fispip-config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no fispip-config.json found above {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// MRPC ids and handlers used on the host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Element service (fetch, upload, check, save, test-compile)
    pub elements: String,
    /// Compile-and-link
    pub compile: String,
    /// Remote execution
    pub execute: String,
    /// Routine registered for compile-and-link
    pub compile_handler: String,
    /// Procedure the bundled remote execution helper is saved as
    pub helper: String,
}

impl RpcSettings {
    /// File name the helper procedure is saved under
    pub fn helper_file(&self) -> String {
        format!("{}.PROC", self.helper)
    }
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            elements: ELEMENT_RPC_ID.to_string(),
            compile: COMPILE_RPC_ID.to_string(),
            execute: EXECUTE_RPC_ID.to_string(),
            compile_handler: COMPILE_HANDLER.to_string(),
            helper: HELPER_NAME.to_string(),
        }
    }
}

/// Connection settings for one host
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Server instance name sent at login
    pub server: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    #[serde(default)]
    pub rpc: RpcSettings,

    /// Connect and read timeout, 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("rpc", &self.rpc)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    /// Load the configuration governing `target` (a file or directory)
    pub fn for_path(target: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let path = Self::discover(target)?;
        let config = Self::load(&path)?;
        Ok((path, config))
    }

    /// Load config from an explicit file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Find the config file for `target`: the nearest one in its directory or
    /// any parent, then the user config dir (~/.config/fispip/)
    pub fn discover(target: &Path) -> Result<PathBuf, ConfigError> {
        find_in_ancestors(target)
            .or_else(|| Self::user_config_path().filter(|p| p.is_file()))
            .ok_or_else(|| ConfigError::NotFound(target.to_path_buf()))
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fispip").join(CONFIG_FILE_NAME))
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            server: self.server.clone(),
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            timeout: self.timeout(),
        }
    }
}

/// Walk from `target` (or its directory, for files) up to the root
pub fn find_in_ancestors(target: &Path) -> Option<PathBuf> {
    let start = if target.is_dir() {
        target
    } else {
        target.parent()?
    };
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}
