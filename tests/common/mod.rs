#![allow(dead_code)]

use anuset_store::{Database, DatabaseConfig};
use std::{
    fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

/// A throwaway store directory under the OS temp dir, removed on drop.
pub struct TempStore {
    pub root: PathBuf,
    pub config: DatabaseConfig,
}

impl TempStore {
    pub fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();

        let mut root = std::env::temp_dir();
        root.push(format!(
            "anuset-store-{label}-{}-{}",
            std::process::id(),
            nanos
        ));

        let config = DatabaseConfig {
            path: root.join("config").join("database.sqlite"),
            backup_dir: root.join("config").join("backups"),
            migrations_dir: root.join("config").join("migrations"),
            backup_enabled: false,
            backup_interval_secs: 0,
            max_backups: 7,
            max_connections: 4,
            op_timeout_ms: 5_000,
        };

        Self { root, config }
    }

    pub fn database(&self) -> Database {
        Database::new(self.config.clone())
    }

    pub async fn open(&self) -> Database {
        Database::setup(self.config.clone())
            .await
            .expect("failed to set up database")
    }
}

impl Drop for TempStore {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}
