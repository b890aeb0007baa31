// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//! Node configuration.
//!
//! Loaded from an optional TOML file, then overridden from `TIDEMARK_*`
//! environment variables, then validated. Every field has a default, so an
//! empty file (or none) yields a working single-node setup under
//! `./tidemark-data`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tidemark_wal::{LogOptions, SyncMode, DEFAULT_MAX_SEGMENT_SIZE};

/// Period of the WAL consumer loop.
pub const CONSUME_INTERVAL: Duration = Duration::from_secs(1);

/// Maximum WAL records replayed per shard per tick.
pub const CONSUMPTION_LIMIT: u64 = 5000;

/// Consecutive replay failures after which a shard is reported as stalled.
pub const STALL_WARN_THRESHOLD: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid environment override {var}={value}: {reason}")]
    Env {
        var: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TidemarkConfig {
    /// Root for WALs, segments and metadata.
    pub data_dir: PathBuf,
    pub segment: SegmentConfig,
    pub wal: WalConfig,
    pub index: IndexDefaults,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// A segment holding more documents than this is mature and stops
    /// receiving writes.
    pub mature_threshold: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalConfig {
    /// Shards replayed concurrently per consumer tick.
    pub parallel: usize,
    pub sync: WalSyncPolicy,
    /// Sync period in `periodic` mode.
    pub sync_interval_ms: u64,
    /// WAL segment file size in bytes before rotation.
    pub max_segment_size: u64,
}

/// Defaults for indexes created without explicit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexDefaults {
    pub default_shards: u32,
    pub default_replicas: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalSyncPolicy {
    Fsync,
    Periodic,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl Default for TidemarkConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tidemark-data"),
            segment: SegmentConfig::default(),
            wal: WalConfig::default(),
            index: IndexDefaults::default(),
            log_format: LogFormat::Text,
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            mature_threshold: 500,
        }
    }
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            parallel: 4,
            sync: WalSyncPolicy::Fsync,
            sync_interval_ms: 200,
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
        }
    }
}

impl Default for IndexDefaults {
    fn default() -> Self {
        Self {
            default_shards: 3,
            default_replicas: 1,
        }
    }
}

impl TidemarkConfig {
    /// Load `path` (when given), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TIDEMARK_*` overrides from `vars`. Unrelated variables are
    /// ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            match var.as_str() {
                "TIDEMARK_DATA_DIR" => self.data_dir = PathBuf::from(&value),
                "TIDEMARK_SEGMENT_MATURE_THRESHOLD" => {
                    self.segment.mature_threshold = parse_env(&var, &value)?
                }
                "TIDEMARK_WAL_PARALLEL" => self.wal.parallel = parse_env(&var, &value)?,
                "TIDEMARK_WAL_SYNC" => self.wal.sync = parse_env_enum(&var, &value)?,
                "TIDEMARK_LOG_FORMAT" => self.log_format = parse_env_enum(&var, &value)?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment.mature_threshold == 0 {
            return Err(ConfigError::Invalid(
                "segment.mature_threshold must be greater than 0".to_string(),
            ));
        }
        if self.wal.parallel == 0 {
            return Err(ConfigError::Invalid(
                "wal.parallel must be greater than 0".to_string(),
            ));
        }
        if self.wal.sync == WalSyncPolicy::Periodic && self.wal.sync_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "wal.sync_interval_ms must be greater than 0 in periodic mode".to_string(),
            ));
        }
        if self.wal.max_segment_size == 0 {
            return Err(ConfigError::Invalid(
                "wal.max_segment_size must be greater than 0".to_string(),
            ));
        }
        if self.index.default_shards == 0 {
            return Err(ConfigError::Invalid(
                "index.default_shards must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for every shard WAL opened by this node.
    pub fn log_options(&self) -> LogOptions {
        let sync_mode = match self.wal.sync {
            WalSyncPolicy::Fsync => SyncMode::Fsync,
            WalSyncPolicy::Periodic => {
                SyncMode::Periodic(Duration::from_millis(self.wal.sync_interval_ms))
            }
            WalSyncPolicy::Async => SyncMode::Async,
        };
        LogOptions {
            sync_mode,
            max_segment_size: self.wal.max_segment_size,
        }
    }

    pub fn wal_dir(&self) -> PathBuf {
        self.data_dir.join("wal")
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.data_dir.join("segments")
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.data_dir.join("metadata.redb")
    }
}

fn parse_env<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a lowercase enum name through its serde representation.
fn parse_env_enum<T: serde::de::DeserializeOwned>(var: &str, value: &str) -> Result<T, ConfigError> {
    let name = value.trim().to_ascii_lowercase();
    serde_json::from_value(serde_json::Value::String(name)).map_err(|e| ConfigError::Env {
        var: var.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
