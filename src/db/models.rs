use crate::db::schema::{Column, Table};
use crate::error::StoreError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// A single SQL value as bound into, or read back from, the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Text(format_timestamp(v))
    }
}

/// Column/value pairs used both as row data and as conjunctive equality filters.
pub type Fields = Vec<(Column, Value)>;

/// Outcome of a write through the record access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Rowid of the inserted (or upserted) row; `0` for update/delete.
    pub id: i64,
    pub changes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub order_by: Vec<(Column, Direction)>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl QueryOptions {
    pub fn order_by(mut self, column: Column, direction: Direction) -> Self {
        self.order_by.push((column, direction));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// One row read back from a table, keyed by column.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: Table,
    values: BTreeMap<Column, Value>,
}

impl Record {
    pub fn new(table: Table, values: BTreeMap<Column, Value>) -> Self {
        Self { table, values }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn get(&self, column: Column) -> Option<&Value> {
        self.values.get(&column)
    }

    pub fn integer(&self, column: Column) -> Result<Option<i64>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(self.corrupt(column, format!("expected integer, found {other:?}"))),
        }
    }

    pub fn text(&self, column: Column) -> Result<Option<&str>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(v)) => Ok(Some(v.as_str())),
            Some(other) => Err(self.corrupt(column, format!("expected text, found {other:?}"))),
        }
    }

    pub fn require_integer(&self, column: Column) -> Result<i64, StoreError> {
        self.integer(column)?
            .ok_or_else(|| self.corrupt(column, "unexpected NULL"))
    }

    pub fn require_text(&self, column: Column) -> Result<&str, StoreError> {
        self.text(column)?
            .ok_or_else(|| self.corrupt(column, "unexpected NULL"))
    }

    pub fn timestamp(&self, column: Column) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.text(column)?
            .map(|raw| parse_timestamp(raw).map_err(|reason| self.corrupt(column, reason)))
            .transpose()
    }

    /// Decode a JSON-encoded column. NULL yields `None`.
    pub fn json<T: DeserializeOwned>(&self, column: Column) -> Result<Option<T>, StoreError> {
        self.text(column)?
            .map(|raw| serde_json::from_str(raw).map_err(|e| self.corrupt(column, e)))
            .transpose()
    }

    fn corrupt(&self, column: Column, reason: impl ToString) -> StoreError {
        StoreError::corrupt(self.table.as_str(), column.as_str(), reason)
    }
}

/// Encode a value for a JSON TEXT column.
pub fn encode_json<T: Serialize + ?Sized>(
    table: Table,
    column: Column,
    value: &T,
) -> Result<Value, StoreError> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|e| StoreError::ValidationError(format!("{}.{}: {e}", table.as_str(), column.as_str())))
}

/// Timestamps are stored as UTC `YYYY-MM-DD HH:MM:SS.ffffff`, the layout of SQLite's
/// `CURRENT_TIMESTAMP` plus microseconds, so column defaults and written values
/// compare as text in time order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

pub type JsonMap = Map<String, JsonValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: Option<String>,
    pub email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub settings: JsonValue,
}

impl TryFrom<Record> for User {
    type Error = StoreError;

    fn try_from(r: Record) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.require_integer(Column::Id)?,
            username: r.require_text(Column::Username)?.to_string(),
            password_hash: r.text(Column::PasswordHash)?.map(str::to_string),
            email: r.text(Column::Email)?.map(str::to_string),
            created_at: r.timestamp(Column::CreatedAt)?,
            last_login: r.timestamp(Column::LastLogin)?,
            settings: r
                .json(Column::Settings)?
                .unwrap_or_else(|| JsonValue::Object(JsonMap::new())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "empty_object")]
    pub settings: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub user_id: Option<i64>,
    pub message: String,
    pub response: Option<String>,
    pub personality: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<Record> for Conversation {
    type Error = StoreError;

    fn try_from(r: Record) -> Result<Self, Self::Error> {
        Ok(Conversation {
            id: r.require_integer(Column::Id)?,
            user_id: r.integer(Column::UserId)?,
            message: r.require_text(Column::Message)?.to_string(),
            response: r.text(Column::Response)?.map(str::to_string),
            personality: r
                .text(Column::Personality)?
                .unwrap_or(DEFAULT_PERSONALITY)
                .to_string(),
            timestamp: r.timestamp(Column::Timestamp)?,
        })
    }
}

pub const DEFAULT_PERSONALITY: &str = "default";

/// A conversation turn as handed over by the chat layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewConversation {
    pub user_id: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarConfig {
    pub id: i64,
    pub user_id: i64,
    pub model_path: Option<String>,
    pub expressions: JsonMap,
    pub animations: JsonMap,
    pub lighting: JsonMap,
    pub created_at: Option<DateTime<Utc>>,
}

impl TryFrom<Record> for AvatarConfig {
    type Error = StoreError;

    fn try_from(r: Record) -> Result<Self, Self::Error> {
        Ok(AvatarConfig {
            id: r.require_integer(Column::Id)?,
            user_id: r.require_integer(Column::UserId)?,
            model_path: r.text(Column::ModelPath)?.map(str::to_string),
            expressions: r.json(Column::Expressions)?.unwrap_or_default(),
            animations: r.json(Column::Animations)?.unwrap_or_default(),
            lighting: r.json(Column::Lighting)?.unwrap_or_default(),
            created_at: r.timestamp(Column::CreatedAt)?,
        })
    }
}

/// Avatar settings to persist; absent sub-objects are stored as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvatarConfigInput {
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub expressions: Option<JsonMap>,
    #[serde(default)]
    pub animations: Option<JsonMap>,
    #[serde(default)]
    pub lighting: Option<JsonMap>,
}

fn empty_object() -> JsonValue {
    JsonValue::Object(JsonMap::new())
}
