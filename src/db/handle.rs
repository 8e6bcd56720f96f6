use crate::config::DatabaseConfig;
use crate::db::sqlite::SqliteStore;
use crate::error::StoreError;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Process-wide database handle.
///
/// Constructed once at startup and cloned into whatever needs the store. The
/// connection is opened and migrated on first use; clones share it.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: DatabaseConfig,
    store: OnceCell<SqliteStore>,
}

impl Database {
    /// Build an unopened handle. Nothing touches the disk until first use.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                store: OnceCell::new(),
            }),
        }
    }

    /// Construct, connect and migrate in one step; meant for process start.
    pub async fn setup(config: DatabaseConfig) -> Result<Self, StoreError> {
        let db = Self::new(config);
        db.store().await?;
        Ok(db)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    /// The open store, connecting and initializing it on first call.
    /// Concurrent first callers wait on a single initialization.
    pub async fn store(&self) -> Result<&SqliteStore, StoreError> {
        self.inner
            .store
            .get_or_try_init(|| async {
                let store = SqliteStore::connect(&self.inner.config).await?;
                store.initialize().await?;
                Ok::<_, StoreError>(store)
            })
            .await
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .store
            .get()
            .is_some_and(|store| !store.is_closed())
    }

    /// Release the connection pool. A no-op if it was never opened or is already closed.
    pub async fn close(&self) {
        if let Some(store) = self.inner.store.get() {
            store.close().await;
        }
    }
}
