//! Daemon configuration.
//!
//! Precedence, lowest first: built-in defaults, TOML file, environment
//! (`CODEPLAY_BIND`, `CODEPLAY_PORT`), then whatever the binary applies
//! from its command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use codeplay_core::LanguageId;

use crate::hub::{HubConfig, DEFAULT_MAX_CONNECTIONS};
use crate::server::{ConnectionSettings, DEFAULT_PORT};

/// Environment variable overriding the bind address.
pub const ENV_BIND: &str = "CODEPLAY_BIND";

/// Environment variable overriding the port.
pub const ENV_PORT: &str = "CODEPLAY_PORT";

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Interface to listen on
    pub bind: String,

    /// TCP port (0 picks an ephemeral port)
    pub port: u16,

    pub max_connections: usize,

    /// Per-connection queue length before deliveries to it are dropped
    pub outbox_capacity: usize,

    /// Replay the current language to each newcomer
    pub push_language_on_join: bool,

    /// Language the session starts with
    pub initial_language: Option<LanguageId>,

    pub idle_timeout_secs: u64,

    pub write_timeout_secs: u64,

    pub handshake_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            outbox_capacity: 256,
            push_language_on_join: true,
            initial_language: None,
            idle_timeout_secs: 120,
            write_timeout_secs: 10,
            handshake_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    /// Reads a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults, or the given file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.bind = bind;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_PORT,
                value: port,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("bind address is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.outbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbox_capacity must be at least 1".to_string(),
            ));
        }
        for (name, secs) in [
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("write_timeout_secs", self.write_timeout_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.initial_language.as_ref().is_some_and(LanguageId::is_blank) {
            return Err(ConfigError::Invalid(
                "initial_language must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// `bind:port`, ready for `HubServer::bind`.
    pub fn socket_addr(&self) -> String {
        if self.bind.contains(':') && !self.bind.starts_with('[') {
            // Bare IPv6 literal.
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
            push_language_on_join: self.push_language_on_join,
            initial_language: self.initial_language.clone(),
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            outbox_capacity: self.outbox_capacity,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
        }
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
