//! SQL DDL for the companion store and the fixed identifier sets queries may use.
//!
//! Table and column names never come from callers as text: every query is built
//! from [`Table`] and [`Column`], and values only ever travel as bound parameters.

use crate::error::StoreError;

/// SQLite schema. Every statement is idempotent so it can run on every startup.
/// - `users.username` UNIQUE, backstop for concurrent seeding
/// - `settings(user_id, key)` UNIQUE, conflict target for setting upserts
/// - unique index on `avatar_configs(user_id)`, one config per user
/// - JSON-encoded columns are stored as TEXT
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT UNIQUE NOT NULL,
    password_hash TEXT,
    email TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    last_login TEXT,
    settings TEXT DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    message TEXT NOT NULL,
    response TEXT,
    personality TEXT DEFAULT 'default',
    timestamp TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id)
);

CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    key TEXT NOT NULL,
    value TEXT,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id),
    UNIQUE(user_id, key)
);

CREATE TABLE IF NOT EXISTS avatar_configs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER,
    model_path TEXT,
    expressions TEXT,
    animations TEXT,
    lighting TEXT,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (user_id) REFERENCES users (id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_avatar_configs_user_id ON avatar_configs(user_id);

CREATE INDEX IF NOT EXISTS idx_conversations_user_timestamp ON conversations(user_id, timestamp);
"#;

/// Username of the row seeded on every fresh store.
pub const DEFAULT_USERNAME: &str = "kali";
pub const DEFAULT_PASSWORD_HASH: &str = "kali";
pub const DEFAULT_EMAIL: &str = "kali@anuset.local";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Users,
    Conversations,
    Settings,
    AvatarConfigs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Id,
    UserId,
    Username,
    PasswordHash,
    Email,
    CreatedAt,
    LastLogin,
    Settings,
    Message,
    Response,
    Personality,
    Timestamp,
    Key,
    Value,
    UpdatedAt,
    ModelPath,
    Expressions,
    Animations,
    Lighting,
}

/// Storage class a column is read back as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Text,
}

impl Table {
    pub const ALL: [Table; 4] = [
        Table::Users,
        Table::Conversations,
        Table::Settings,
        Table::AvatarConfigs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Conversations => "conversations",
            Table::Settings => "settings",
            Table::AvatarConfigs => "avatar_configs",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        use Column::*;
        match self {
            Table::Users => &[
                Id,
                Username,
                PasswordHash,
                Email,
                CreatedAt,
                LastLogin,
                Settings,
            ],
            Table::Conversations => &[Id, UserId, Message, Response, Personality, Timestamp],
            Table::Settings => &[Id, UserId, Key, Value, UpdatedAt],
            Table::AvatarConfigs => &[
                Id,
                UserId,
                ModelPath,
                Expressions,
                Animations,
                Lighting,
                CreatedAt,
            ],
        }
    }

    /// Column sets backed by a UNIQUE constraint; the only valid upsert keys.
    pub fn unique_keys(self) -> &'static [&'static [Column]] {
        match self {
            Table::Users => &[&[Column::Username]],
            Table::Conversations => &[],
            Table::Settings => &[&[Column::UserId, Column::Key]],
            Table::AvatarConfigs => &[&[Column::UserId]],
        }
    }

    pub fn has_column(self, column: Column) -> bool {
        self.columns().contains(&column)
    }

    /// Reject columns that do not belong to this table, and repeated columns.
    pub fn check_columns<'a, I>(self, columns: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = &'a Column>,
    {
        let mut seen: Vec<Column> = Vec::new();
        for &column in columns {
            if !self.has_column(column) {
                return Err(StoreError::InvalidQuery(format!(
                    "column `{}` does not exist on `{}`",
                    column.as_str(),
                    self.as_str()
                )));
            }
            if seen.contains(&column) {
                return Err(StoreError::InvalidQuery(format!(
                    "column `{}` given more than once",
                    column.as_str()
                )));
            }
            seen.push(column);
        }
        Ok(())
    }

    /// Find the unique key matching exactly the given columns, in any order.
    pub fn unique_key_for(self, columns: &[Column]) -> Option<&'static [Column]> {
        self.unique_keys().iter().copied().find(|key| {
            key.len() == columns.len() && key.iter().all(|c| columns.contains(c))
        })
    }
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::UserId => "user_id",
            Column::Username => "username",
            Column::PasswordHash => "password_hash",
            Column::Email => "email",
            Column::CreatedAt => "created_at",
            Column::LastLogin => "last_login",
            Column::Settings => "settings",
            Column::Message => "message",
            Column::Response => "response",
            Column::Personality => "personality",
            Column::Timestamp => "timestamp",
            Column::Key => "key",
            Column::Value => "value",
            Column::UpdatedAt => "updated_at",
            Column::ModelPath => "model_path",
            Column::Expressions => "expressions",
            Column::Animations => "animations",
            Column::Lighting => "lighting",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Id | Column::UserId => ColumnKind::Integer,
            _ => ColumnKind::Text,
        }
    }

    /// Double-quoted identifier; `key` and `timestamp` are SQL keywords.
    pub fn quoted(self) -> String {
        format!("\"{}\"", self.as_str())
    }
}
