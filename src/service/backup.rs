use crate::config::DatabaseConfig;
use crate::db::sqlite::SqliteStore;
use crate::error::StoreError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tracing::{info, warn};

const BACKUP_PREFIX: &str = "database-";
const BACKUP_EXT: &str = ".sqlite";

/// Snapshots the store into `backup_dir` and keeps at most `max_backups` of them.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            max_backups,
        }
    }

    pub fn from_config(cfg: &DatabaseConfig) -> Self {
        Self::new(cfg.backup_dir.clone(), cfg.max_backups)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Take a consistent snapshot of `store` and return its path.
    ///
    /// Eviction of old backups runs afterwards; an eviction failure is logged and
    /// does not fail the backup that was just written.
    pub async fn create_backup(&self, store: &SqliteStore) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;

        let path = self.claim_path(Utc::now()).await?;
        if let Err(e) = store.snapshot_into(&path).await {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        info!(path = %path.display(), "backup created");

        if let Err(e) = self.prune().await {
            warn!(dir = %self.backup_dir.display(), error = %e, "backup eviction failed");
        }
        Ok(path)
    }

    /// Backup files in `backup_dir`, oldest first. Unrelated files are ignored.
    pub async fn list_backups(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(key) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(backup_sort_key)
            else {
                continue;
            };
            found.push((key, path));
        }
        found.sort();
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Remove the oldest backups beyond `max_backups`. Returns the removed paths.
    pub async fn prune(&self) -> Result<Vec<PathBuf>, StoreError> {
        if self.max_backups == 0 {
            return Ok(Vec::new());
        }
        let backups = self.list_backups().await?;
        let excess = backups.len().saturating_sub(self.max_backups);
        let mut removed = Vec::with_capacity(excess);
        for path in backups.into_iter().take(excess) {
            tokio::fs::remove_file(&path).await?;
            removed.push(path);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), keep = self.max_backups, "old backups evicted");
        }
        Ok(removed)
    }

    /// Create an empty file for a backup taken at `at` and return its path.
    ///
    /// Same-millisecond backups get a `-N` suffix above every existing one, so names
    /// sort in creation order. The file is created with `create_new`, so concurrent
    /// callers never share a target; `VACUUM INTO` accepts an empty file.
    async fn claim_path(&self, at: DateTime<Utc>) -> Result<PathBuf, StoreError> {
        let stem = backup_stem(at);
        let Some((stamp, _)) = backup_sort_key(&format!("{stem}{BACKUP_EXT}")) else {
            return Err(StoreError::InvalidQuery(format!("bad backup name {stem}")));
        };

        let mut next = self
            .list_backups()
            .await?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).and_then(backup_sort_key))
            .filter(|(s, _)| *s == stamp)
            .map(|(_, seq)| seq + 1)
            .max();

        loop {
            let name = match next {
                None => format!("{stem}{BACKUP_EXT}"),
                Some(n) => format!("{stem}-{n}{BACKUP_EXT}"),
            };
            let path = self.backup_dir.join(name);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    next = Some(next.map_or(1, |n| n + 1));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// `database-<ISO 8601 with ':' and '.' replaced by '-'>`.
pub fn backup_stem(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{BACKUP_PREFIX}{stamp}")
}

pub fn backup_file_name(at: DateTime<Utc>) -> String {
    format!("{}{BACKUP_EXT}", backup_stem(at))
}

/// Chronological ordering key of a backup file name, `None` for foreign files.
fn backup_sort_key(name: &str) -> Option<(String, u32)> {
    let stem = name.strip_prefix(BACKUP_PREFIX)?.strip_suffix(BACKUP_EXT)?;
    let z = stem.rfind('Z')?;
    let (stamp, rest) = stem.split_at(z + 1);
    let seq = match rest {
        "" => 0,
        _ => rest.strip_prefix('-')?.parse().ok()?,
    };
    Some((stamp.to_string(), seq))
}
