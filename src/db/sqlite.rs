use crate::config::DatabaseConfig;
use crate::db::models::{Direction, Fields, QueryOptions, Record, Value, WriteResult};
use crate::db::schema::{
    Column, ColumnKind, DEFAULT_EMAIL, DEFAULT_PASSWORD_HASH, DEFAULT_USERNAME, SQLITE_INIT,
    Table,
};
use crate::error::StoreError;
use chrono::Utc;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, QueryBuilder, Row, Sqlite};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SqlitePool = Pool<Sqlite>;

/// The embedded store: schema setup plus generic, parameterized record access.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    op_timeout: Duration,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Open (creating if missing) the database file named by `cfg.path`.
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(parent) = cfg.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::StorageUnavailable(format!(
                    "failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let op_timeout = cfg.op_timeout();
        let connect_opts = SqliteConnectOptions::new()
            .filename(&cfg.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(op_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(cfg.max_connections.max(1))
            .acquire_timeout(op_timeout)
            .connect_with(connect_opts)
            .await
            .map_err(|e| {
                StoreError::StorageUnavailable(format!(
                    "failed to open {}: {e}",
                    cfg.path.display()
                ))
            })?;

        info!(path = %cfg.path.display(), "sqlite store connected");
        Ok(Self::new(pool, op_timeout))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables, then make sure the default user exists.
    /// Safe to run repeatedly and from concurrent processes.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.init_schema().await?;
        self.seed_default_user().await
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            self.timed("init_schema", sqlx::query(s).execute(&self.pool))
                .await?;
        }
        Ok(())
    }

    async fn seed_default_user(&self) -> Result<(), StoreError> {
        let existing = self
            .get(
                Table::Users,
                &vec![(Column::Username, Value::from(DEFAULT_USERNAME))],
            )
            .await?;
        if existing.is_some() {
            return Ok(());
        }

        let settings = json!({ "theme": "dark", "language": "es" }).to_string();
        let seeded = self
            .insert(
                Table::Users,
                &vec![
                    (Column::Username, Value::from(DEFAULT_USERNAME)),
                    (Column::PasswordHash, Value::from(DEFAULT_PASSWORD_HASH)),
                    (Column::Email, Value::from(DEFAULT_EMAIL)),
                    (Column::CreatedAt, Value::from(Utc::now())),
                    (Column::Settings, Value::from(settings)),
                ],
            )
            .await;

        match seeded {
            Ok(res) => {
                info!(id = res.id, username = DEFAULT_USERNAME, "default user created");
                Ok(())
            }
            // Another connection seeded first.
            Err(StoreError::DuplicateKey(reason)) => {
                warn!(username = DEFAULT_USERNAME, %reason, "default user already seeded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch at most one row matching all `conditions`. An empty filter is rejected.
    pub async fn get(&self, table: Table, conditions: &Fields) -> Result<Option<Record>, StoreError> {
        if conditions.is_empty() {
            return Err(StoreError::InvalidQuery(format!(
                "point lookup on `{}` requires at least one condition",
                table.as_str()
            )));
        }
        table.check_columns(conditions.iter().map(|(c, _)| c))?;

        let mut qb = select_from(table);
        push_where(&mut qb, conditions);
        qb.push(" LIMIT 1");

        let row = self
            .timed("get", qb.build().fetch_optional(&self.pool))
            .await?;
        row.map(|r| row_to_record(table, &r)).transpose()
    }

    /// Fetch every row matching all `conditions`, ordered and paginated per `options`.
    pub async fn all(
        &self,
        table: Table,
        conditions: &Fields,
        options: &QueryOptions,
    ) -> Result<Vec<Record>, StoreError> {
        table.check_columns(conditions.iter().map(|(c, _)| c))?;
        table.check_columns(options.order_by.iter().map(|(c, _)| c))?;

        let mut qb = select_from(table);
        push_where(&mut qb, conditions);

        if !options.order_by.is_empty() {
            qb.push(" ORDER BY ");
            let mut order = qb.separated(", ");
            for (column, direction) in &options.order_by {
                order.push(column.quoted());
                order.push_unseparated(match direction {
                    Direction::Asc => " ASC",
                    Direction::Desc => " DESC",
                });
            }
        }

        match (options.limit, options.offset) {
            (Some(limit), offset) => {
                qb.push(" LIMIT ").push_bind(i64::from(limit));
                if let Some(offset) = offset {
                    qb.push(" OFFSET ").push_bind(i64::from(offset));
                }
            }
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            (None, Some(offset)) => {
                qb.push(" LIMIT -1 OFFSET ").push_bind(i64::from(offset));
            }
            (None, None) => {}
        }

        let rows = self.timed("all", qb.build().fetch_all(&self.pool)).await?;
        rows.iter().map(|r| row_to_record(table, r)).collect()
    }

    /// Count rows matching all `conditions`.
    pub async fn count(&self, table: Table, conditions: &Fields) -> Result<i64, StoreError> {
        table.check_columns(conditions.iter().map(|(c, _)| c))?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
        qb.push(table.as_str());
        push_where(&mut qb, conditions);

        let row = self.timed("count", qb.build().fetch_one(&self.pool)).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    pub async fn insert(&self, table: Table, data: &Fields) -> Result<WriteResult, StoreError> {
        check_data(table, data)?;

        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        push_insert(&mut qb, table, data);

        let res = self.timed("insert", qb.build().execute(&self.pool)).await?;
        debug!(table = table.as_str(), id = res.last_insert_rowid(), "row inserted");
        Ok(WriteResult {
            id: res.last_insert_rowid(),
            changes: res.rows_affected(),
        })
    }

    /// Set `data` on every row matching `conditions`. Zero matches is not an error.
    pub async fn update(
        &self,
        table: Table,
        data: &Fields,
        conditions: &Fields,
    ) -> Result<WriteResult, StoreError> {
        check_data(table, data)?;
        check_filter(table, conditions, "update")?;

        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE ");
        qb.push(table.as_str()).push(" SET ");
        let mut set = qb.separated(", ");
        for (column, value) in data {
            set.push(column.quoted());
            set.push_unseparated(" = ");
            push_value_unseparated(&mut set, value);
        }
        push_where(&mut qb, conditions);

        let res = self.timed("update", qb.build().execute(&self.pool)).await?;
        Ok(WriteResult {
            id: 0,
            changes: res.rows_affected(),
        })
    }

    pub async fn delete(&self, table: Table, conditions: &Fields) -> Result<WriteResult, StoreError> {
        check_filter(table, conditions, "delete")?;

        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM ");
        qb.push(table.as_str());
        push_where(&mut qb, conditions);

        let res = self.timed("delete", qb.build().execute(&self.pool)).await?;
        Ok(WriteResult {
            id: 0,
            changes: res.rows_affected(),
        })
    }

    /// Insert `conditions ∪ data` or, if a row with the same `conditions` exists,
    /// overwrite its `data` columns. One statement, so concurrent writers cannot
    /// both miss and double-insert. `conditions` must name a unique key of `table`.
    pub async fn upsert(
        &self,
        table: Table,
        data: &Fields,
        conditions: &Fields,
    ) -> Result<WriteResult, StoreError> {
        check_filter(table, conditions, "upsert")?;
        check_data(table, data)?;
        // NULL never conflicts in a unique index, so it cannot select a row.
        if let Some((column, _)) = conditions.iter().find(|(_, v)| matches!(v, Value::Null)) {
            return Err(StoreError::InvalidQuery(format!(
                "upsert key column `{}` cannot be NULL",
                column.as_str()
            )));
        }

        let key_columns: Vec<Column> = conditions.iter().map(|(c, _)| *c).collect();
        let key = table.unique_key_for(&key_columns).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "upsert on `{}` needs conditions naming a unique key",
                table.as_str()
            ))
        })?;

        let mut row: Fields = conditions.clone();
        for (column, value) in data {
            match conditions.iter().find(|(c, _)| c == column) {
                Some((_, existing)) if existing != value => {
                    return Err(StoreError::InvalidQuery(format!(
                        "upsert data overrides key column `{}`",
                        column.as_str()
                    )));
                }
                Some(_) => {}
                None => row.push((*column, value.clone())),
            }
        }

        let mut qb = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        push_insert(&mut qb, table, &row);

        qb.push(" ON CONFLICT(");
        let mut target = qb.separated(", ");
        for column in key {
            target.push(column.quoted());
        }
        qb.push(") DO UPDATE SET ");

        let updates: Vec<Column> = row
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| !key.contains(c))
            .collect();
        // RETURNING needs the conflicting row touched, so a key-only upsert rewrites a key column.
        let updates = if updates.is_empty() { vec![key[0]] } else { updates };
        let mut set = qb.separated(", ");
        for column in updates {
            set.push(format!("{0} = excluded.{0}", column.quoted()));
        }
        qb.push(" RETURNING id");

        let returned = self
            .timed("upsert", qb.build().fetch_one(&self.pool))
            .await?;
        let id: i64 = returned.try_get("id")?;
        debug!(table = table.as_str(), id, "row upserted");
        Ok(WriteResult { id, changes: 1 })
    }

    /// Write a transactionally consistent copy of the whole store to `dest`.
    pub async fn snapshot_into(&self, dest: &Path) -> Result<(), StoreError> {
        let dest = dest.to_string_lossy().into_owned();
        self.timed(
            "snapshot",
            sqlx::query("VACUUM INTO ?").bind(dest).execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("sqlite store closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Bound a single engine request by the configured operation timeout.
    async fn timed<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(res) => res.map_err(StoreError::from),
            Err(_) => Err(StoreError::StorageUnavailable(format!(
                "{op} timed out after {} ms",
                self.op_timeout.as_millis()
            ))),
        }
    }
}

fn check_data(table: Table, data: &Fields) -> Result<(), StoreError> {
    if data.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "no columns given for `{}`",
            table.as_str()
        )));
    }
    table.check_columns(data.iter().map(|(c, _)| c))
}

fn check_filter(table: Table, conditions: &Fields, op: &str) -> Result<(), StoreError> {
    if conditions.is_empty() {
        return Err(StoreError::InvalidQuery(format!(
            "{op} on `{}` requires at least one condition",
            table.as_str()
        )));
    }
    table.check_columns(conditions.iter().map(|(c, _)| c))
}

fn select_from(table: Table) -> QueryBuilder<'static, Sqlite> {
    let columns: Vec<String> = table.columns().iter().map(|c| c.quoted()).collect();
    let mut qb = QueryBuilder::new("SELECT ");
    qb.push(columns.join(", "))
        .push(" FROM ")
        .push(table.as_str());
    qb
}

fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, conditions: &Fields) {
    if conditions.is_empty() {
        return;
    }
    qb.push(" WHERE ");
    let mut clause = qb.separated(" AND ");
    for (column, value) in conditions {
        clause.push(column.quoted());
        // `= NULL` never matches; a NULL condition means IS NULL.
        if matches!(value, Value::Null) {
            clause.push_unseparated(" IS NULL");
        } else {
            clause.push_unseparated(" = ");
            push_value_unseparated(&mut clause, value);
        }
    }
}

fn push_insert(qb: &mut QueryBuilder<'_, Sqlite>, table: Table, data: &Fields) {
    qb.push(table.as_str()).push(" (");
    let mut columns = qb.separated(", ");
    for (column, _) in data {
        columns.push(column.quoted());
    }
    qb.push(") VALUES (");
    let mut values = qb.separated(", ");
    for (_, value) in data {
        match value.clone() {
            Value::Null => values.push_bind(None::<String>),
            Value::Integer(v) => values.push_bind(v),
            Value::Text(v) => values.push_bind(v),
        };
    }
    qb.push(")");
}

fn push_value_unseparated(
    sep: &mut sqlx::query_builder::Separated<'_, '_, Sqlite, &'static str>,
    value: &Value,
) {
    match value.clone() {
        Value::Null => sep.push_bind_unseparated(None::<String>),
        Value::Integer(v) => sep.push_bind_unseparated(v),
        Value::Text(v) => sep.push_bind_unseparated(v),
    };
}

fn row_to_record(table: Table, row: &SqliteRow) -> Result<Record, StoreError> {
    let mut values = BTreeMap::new();
    for &column in table.columns() {
        let value = match column.kind() {
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(column.as_str())?
                .map(Value::Integer),
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(column.as_str())?
                .map(Value::Text),
        };
        values.insert(column, value.unwrap_or(Value::Null));
    }
    Ok(Record::new(table, values))
}
