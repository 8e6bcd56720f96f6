pub mod backup;
pub mod backup_actor;
pub mod repository;

pub use backup::BackupManager;
pub use backup_actor::{BackupArgs, BackupHandle};
pub use repository::Repository;
