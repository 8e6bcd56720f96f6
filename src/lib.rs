pub mod config;
pub mod db;
pub mod error;
pub mod service;

pub use config::{Config, DatabaseConfig};
pub use db::Database;
pub use error::StoreError;
pub use service::{BackupManager, Repository};
