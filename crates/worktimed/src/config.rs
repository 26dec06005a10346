//! Daemon configuration.
//!
//! Read from `$XDG_CONFIG_HOME/worktime/config.toml` (or `--config`). Every
//! key is optional; a missing file means defaults.
//!
//! ```toml
//! socket_path = "/run/user/1000/worktime.sock"
//! refresh_interval_secs = 30
//! drift_threshold_secs = 300
//! utc_offset_minutes = 60
//!
//! [targets]
//! fri = 21600
//! sat = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Weekday};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;
use tracing::debug;

use worktime_core::{DailyTargetPolicy, DEFAULT_DRIFT_THRESHOLD_SECS};

use crate::ledger::{LedgerSettings, DEFAULT_REFRESH_INTERVAL_SECS};

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/worktime.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "WORKTIME_SOCKET";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {error}")]
    Read { path: PathBuf, error: String },

    #[error("Invalid config {path}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("UTC offset out of range: {0} minutes")]
    InvalidOffset(i32),
}

/// Per-weekday target overrides, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetOverrides {
    pub mon: Option<u64>,
    pub tue: Option<u64>,
    pub wed: Option<u64>,
    pub thu: Option<u64>,
    pub fri: Option<u64>,
    pub sat: Option<u64>,
    pub sun: Option<u64>,
}

impl TargetOverrides {
    fn iter(&self) -> impl Iterator<Item = (Weekday, u64)> + '_ {
        [
            (Weekday::Mon, self.mon),
            (Weekday::Tue, self.tue),
            (Weekday::Wed, self.wed),
            (Weekday::Thu, self.thu),
            (Weekday::Fri, self.fri),
            (Weekday::Sat, self.sat),
            (Weekday::Sun, self.sun),
        ]
        .into_iter()
        .filter_map(|(day, secs)| secs.map(|s| (day, s)))
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub socket_path: Option<PathBuf>,
    pub refresh_interval_secs: Option<u64>,
    pub drift_threshold_secs: Option<u64>,
    pub utc_offset_minutes: Option<i32>,
    pub targets: TargetOverrides,
}

impl DaemonConfig {
    /// Default location of the config file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("worktime").join("config.toml"))
    }

    /// Loads `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or invalid one is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Self::from_toml(&contents).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse { path, error },
            other => other,
        })
    }

    /// Parses TOML text.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Socket path: `WORKTIME_SOCKET`, then the file, then the default.
    pub fn socket_path(&self, env_override: Option<String>) -> PathBuf {
        env_override
            .map(PathBuf::from)
            .or_else(|| self.socket_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH))
    }

    /// Builds the target policy.
    pub fn policy(&self) -> Result<DailyTargetPolicy, ConfigError> {
        let minutes = self.utc_offset_minutes.unwrap_or(0);
        let offset = FixedOffset::east_opt(minutes.saturating_mul(60))
            .ok_or(ConfigError::InvalidOffset(minutes))?;

        Ok(self
            .targets
            .iter()
            .fold(DailyTargetPolicy::default().with_offset(offset), |policy, (day, secs)| {
                policy.with_target(day, secs)
            }))
    }

    /// Builds the ledger settings. A refresh interval of 0 disables refresh.
    pub fn ledger_settings(&self) -> Result<LedgerSettings, ConfigError> {
        let refresh = self
            .refresh_interval_secs
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);

        Ok(LedgerSettings {
            policy: self.policy()?,
            drift_threshold_secs: self
                .drift_threshold_secs
                .unwrap_or(DEFAULT_DRIFT_THRESHOLD_SECS),
            refresh_interval: (refresh > 0).then(|| Duration::from_secs(refresh)),
        })
    }
}
