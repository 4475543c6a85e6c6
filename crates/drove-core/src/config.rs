//! Configuration parsing.
//!
//! A drove configuration file is TOML with a `[daemon]` section for the
//! scheduler and a `[pool]` section describing the supervised service.
//! Durations use humantime notation (`"1s"`, `"250ms"`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pool::PoolSettings;
use crate::util::{to_gid, to_uid};
use crate::worker::process::DEFAULT_STOP_TIMEOUT;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Scheduler configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// The supervised pool.
    pub pool: PoolConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pool.name must not be empty".to_string(),
            ));
        }
        if self.pool.cmd.trim().is_empty() {
            return Err(ConfigError::Validation(
                "pool.cmd must not be empty".to_string(),
            ));
        }
        if self.daemon.check_delay.is_zero() {
            return Err(ConfigError::Validation(
                "daemon.check_delay must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Interval between convergence passes.
    #[serde(default = "default_check_delay", with = "humantime_serde")]
    pub check_delay: Duration,

    /// Grace period between SIGTERM and SIGKILL when stopping a worker.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,
}

const fn default_check_delay() -> Duration {
    Duration::from_secs(1)
}

const fn default_stop_timeout() -> Duration {
    DEFAULT_STOP_TIMEOUT
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            check_delay: default_check_delay(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// Pool definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Pool name.
    pub name: String,

    /// Command run by each worker.
    pub cmd: String,

    /// Number of workers to keep running.
    #[serde(default = "default_num_flies")]
    pub num_flies: u32,

    /// Pause between successive spawns.
    #[serde(default, with = "humantime_serde")]
    pub warmup_delay: Duration,

    /// Working directory; defaults to the daemon's.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Run the command through `/bin/sh -c`.
    #[serde(default)]
    pub shell: bool,

    /// User name or numeric uid.
    #[serde(default)]
    pub uid: Option<String>,

    /// Group name or numeric gid.
    #[serde(default)]
    pub gid: Option<String>,

    /// Reload workers with SIGHUP instead of replacing them.
    #[serde(default)]
    pub send_hup: bool,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Start with the pool stopped.
    #[serde(default)]
    pub stopped: bool,
}

const fn default_num_flies() -> u32 {
    1
}

impl PoolConfig {
    /// Resolve credentials and build pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the user or group does not
    /// resolve.
    pub fn to_settings(&self) -> Result<PoolSettings, ConfigError> {
        let uid = match &self.uid {
            Some(user) => {
                to_uid(user).map_err(|e| ConfigError::Validation(format!("pool.uid: {e}")))?
            },
            None => None,
        };
        let gid = match &self.gid {
            Some(group) => {
                to_gid(group).map_err(|e| ConfigError::Validation(format!("pool.gid: {e}")))?
            },
            None => None,
        };

        Ok(PoolSettings {
            name: self.name.clone(),
            command: self.cmd.clone(),
            num_flies: self.num_flies as usize,
            warmup_delay: self.warmup_delay,
            working_dir: self.working_dir.clone(),
            shell: self.shell,
            uid,
            gid,
            send_hup: self.send_hup,
            env: self.env.clone(),
            stopped: self.stopped,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
