//! Configuration file support for swift-package-info
//!
//! Reads configuration from `~/.config/swift-package-info/config.json`:
//!
//! ```json
//! {
//!   "empty_app": {
//!     "repository": "https://github.com/org/EmptyApp.git",
//!     "reference": "1.0.0",
//!     "name": "EmptyApp"
//!   },
//!   "architecture": "arm64",
//!   "command_timeout_secs": 30,
//!   "clone_timeout_secs": 15
//! }
//! ```

use crate::process::{CLONE_TIMEOUT, DEFAULT_TIMEOUT};
use crate::reference::repository_name;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Baseline app cloned for size measurements
const DEFAULT_EMPTY_APP_REPOSITORY: &str = "https://github.com/marinofelipe/EmptyApp.git";
const DEFAULT_EMPTY_APP_REFERENCE: &str = "1.0.0";
const DEFAULT_EMPTY_APP_NAME: &str = "EmptyApp";

const DEFAULT_ARCHITECTURE: &str = "arm64";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot determine config directory. HOME environment variable not set.")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid empty app repository '{repository}': its name must be a plain directory name")]
    InvalidEmptyApp { repository: String },
}

/// Location of the baseline application
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmptyApp {
    /// Git URL, cloned into a directory named after the repository
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Pinned tag or branch
    #[serde(default = "default_reference")]
    pub reference: String,

    /// Name of the `.xcodeproj`, its scheme and the built `.app`
    #[serde(default = "default_name")]
    pub name: String,
}

impl EmptyApp {
    /// Directory the repository clones into, `None` unless it is a single
    /// plain path component
    pub fn directory_name(&self) -> Option<String> {
        let name = repository_name(&self.repository);
        let mut components = Path::new(&name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Some(name),
            _ => None,
        }
    }
}

impl Default for EmptyApp {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            reference: default_reference(),
            name: default_name(),
        }
    }
}

/// Top-level configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub empty_app: EmptyApp,

    /// Architecture passed to `xcodebuild -arch`
    #[serde(default = "default_architecture")]
    pub architecture: String,

    /// Limit for git network operations during resolution (default: 30)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Limit for cloning the empty app (default: 15)
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            empty_app: EmptyApp::default(),
            architecture: default_architecture(),
            command_timeout_secs: default_command_timeout(),
            clone_timeout_secs: default_clone_timeout(),
        }
    }
}

fn default_repository() -> String {
    DEFAULT_EMPTY_APP_REPOSITORY.to_string()
}

fn default_reference() -> String {
    DEFAULT_EMPTY_APP_REFERENCE.to_string()
}

fn default_name() -> String {
    DEFAULT_EMPTY_APP_NAME.to_string()
}

fn default_architecture() -> String {
    DEFAULT_ARCHITECTURE.to_string()
}

fn default_command_timeout() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_clone_timeout() -> u64 {
    CLONE_TIMEOUT.as_secs()
}

impl Config {
    /// Load configuration from the default path or return defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|source| ConfigError::ParseError { path, source })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.empty_app.directory_name().is_none() {
            return Err(ConfigError::InvalidEmptyApp {
                repository: self.empty_app.repository.clone(),
            });
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
}

/// Returns the config file path: `~/.config/swift-package-info/config.json`
pub fn config_path() -> Result<PathBuf, ConfigError> {
    // Use XDG_CONFIG_HOME if set, otherwise fall back to ~/.config
    let config_base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".config"))
                .unwrap_or_default()
        });

    if config_base.as_os_str().is_empty() {
        return Err(ConfigError::NoConfigDir);
    }

    Ok(config_base.join("swift-package-info").join("config.json"))
}
