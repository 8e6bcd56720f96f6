//! Database module: schema, row models and the SQLite-backed store.
//!
//! Layout:
//! - `schema.rs`: SQL DDL and the fixed table/column identifier sets
//! - `models.rs`: values, generic records and typed domain rows
//! - `sqlite.rs`: schema initialization and parameterized record access
//! - `handle.rs`: the shared, lazily opened database handle

pub mod handle;
pub mod models;
pub mod schema;
pub mod sqlite;

pub use handle::Database;
pub use models::{
    AvatarConfig, AvatarConfigInput, Conversation, Direction, Fields, NewConversation, NewUser,
    QueryOptions, Record, User, Value, WriteResult,
};
pub use schema::{Column, SQLITE_INIT, Table};
pub use sqlite::{SqlitePool, SqliteStore};
