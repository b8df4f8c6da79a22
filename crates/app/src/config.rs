//! Server configuration
//!
//! A small TOML file: listen address and an optional extra-scripts
//! directory. Loaded from an explicit path argument, else the platform
//! config directory; a missing file just means defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid listen address {0:?}")]
    BadListenAddr(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the room server binds
    pub listen: String,
    /// Directory scanned for extra script TOML files
    pub scripts_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7432".into(),
            scripts_dir: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`. A
    /// missing default file yields the default config; an explicit path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };
        let config: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::BadListenAddr(self.listen.clone()))
    }
}

/// `<platform config dir>/lantern/config.toml`
fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "lantern", "lantern")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
