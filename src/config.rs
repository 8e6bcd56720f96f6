//! Layered runtime configuration.
//!
//! Built-in defaults are overridden by `ANUSET_`-prefixed environment variables,
//! with `__` separating nested keys (e.g. `ANUSET_DATABASE__MAX_BACKUPS=3`).

use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loglevel: String,
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loglevel: "info".to_string(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Defaults merged with the process environment.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("ANUSET_").split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file; its parent directory is created on first connect.
    pub path: PathBuf,
    pub backup_dir: PathBuf,
    /// Reserved for file-based migrations; the schema is currently built in.
    pub migrations_dir: PathBuf,
    pub backup_enabled: bool,
    pub backup_interval_secs: u64,
    /// Oldest backups beyond this count are evicted. `0` keeps everything.
    pub max_backups: usize,
    pub max_connections: u32,
    pub op_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("config/database.sqlite"),
            backup_dir: PathBuf::from("config/backups"),
            migrations_dir: PathBuf::from("config/migrations"),
            backup_enabled: true,
            backup_interval_secs: 24 * 60 * 60,
            max_backups: 7,
            max_connections: 4,
            op_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms.max(1))
    }

    /// Scheduled backup period, `None` when periodic backups are off.
    pub fn backup_interval(&self) -> Option<Duration> {
        (self.backup_enabled && self.backup_interval_secs > 0)
            .then(|| Duration::from_secs(self.backup_interval_secs))
    }
}
