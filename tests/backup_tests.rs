mod common;

use anuset_store::db::{Column, Direction, QueryOptions, Record, SqliteStore, Table};
use anuset_store::service::backup_actor::{self, BackupArgs};
use anuset_store::{BackupManager, Repository};
use common::TempStore;
use serde_json::json;
use std::time::Duration;

async fn dump(store: &SqliteStore) -> Vec<Vec<Record>> {
    let by_id = QueryOptions::default().order_by(Column::Id, Direction::Asc);
    let mut tables = Vec::new();
    for table in Table::ALL {
        tables.push(store.all(table, &vec![], &by_id).await.expect("dump table"));
    }
    tables
}

#[tokio::test]
async fn backup_matches_live_store() {
    let tmp = TempStore::new("backup-snapshot");
    let db = tmp.open().await;
    let repo = Repository::new(db.clone());
    let uid = repo.get_user("kali").await.expect("get").expect("kali").id;
    repo.set_setting(uid, "theme", "dark").await.expect("set");

    let store = db.store().await.expect("store");
    let manager = BackupManager::from_config(&tmp.config);
    let path = manager.create_backup(store).await.expect("backup");

    assert_eq!(path.parent(), Some(tmp.config.backup_dir.as_path()));
    let name = path.file_name().and_then(|n| n.to_str()).expect("file name");
    assert!(name.starts_with("database-"), "{name}");
    assert!(name.ends_with(".sqlite"), "{name}");
    assert!(!name.trim_end_matches(".sqlite").contains([':', '.']), "{name}");

    let live = dump(store).await;

    // writes after the snapshot must not show up in it
    repo.set_setting(uid, "theme", "light").await.expect("set");

    let mut copy_cfg = tmp.config.clone();
    copy_cfg.path = path.clone();
    let copy = SqliteStore::connect(&copy_cfg).await.expect("open backup");
    assert_eq!(dump(&copy).await, live);
    copy.close().await;

    assert_eq!(
        repo.get_setting(uid, "theme").await.expect("get"),
        Some(json!("light"))
    );
    db.close().await;
}

#[tokio::test]
async fn oldest_backups_are_evicted() {
    let tmp = TempStore::new("backup-retention");
    let db = tmp.open().await;
    let store = db.store().await.expect("store");
    let manager = BackupManager::new(tmp.config.backup_dir.clone(), 2);

    let mut made = Vec::new();
    for _ in 0..4 {
        made.push(manager.create_backup(store).await.expect("backup"));
    }

    let kept = manager.list_backups().await.expect("list");
    assert_eq!(kept, made[2..].to_vec());
    assert!(!made[0].exists());
    assert!(!made[1].exists());
    db.close().await;
}

#[tokio::test]
async fn unrelated_files_survive_eviction() {
    let tmp = TempStore::new("backup-foreign");
    let db = tmp.open().await;
    let store = db.store().await.expect("store");
    let manager = BackupManager::new(tmp.config.backup_dir.clone(), 1);

    std::fs::create_dir_all(&tmp.config.backup_dir).expect("mkdir");
    let notes = tmp.config.backup_dir.join("notes.txt");
    std::fs::write(&notes, b"keep me").expect("write");

    manager.create_backup(store).await.expect("backup");
    manager.create_backup(store).await.expect("backup");

    assert_eq!(manager.list_backups().await.expect("list").len(), 1);
    assert!(notes.exists());
    db.close().await;
}

#[tokio::test]
async fn listing_a_missing_directory_is_empty() {
    let tmp = TempStore::new("backup-missing");
    let manager = BackupManager::new(tmp.root.join("never-created"), 3);
    assert!(manager.list_backups().await.expect("list").is_empty());
    assert!(manager.prune().await.expect("prune").is_empty());
}

#[tokio::test]
async fn actor_takes_backups_on_request() {
    let tmp = TempStore::new("backup-actor");
    let db = tmp.open().await;

    let handle = backup_actor::spawn(BackupArgs {
        db: db.clone(),
        manager: BackupManager::from_config(&tmp.config),
        interval: None,
    })
    .await
    .expect("spawn");

    let path = handle.create_backup().await.expect("backup");
    assert!(path.exists());

    handle.stop();
    db.close().await;
}

#[tokio::test]
async fn actor_takes_scheduled_backups() {
    let tmp = TempStore::new("backup-schedule");
    let db = tmp.open().await;
    let manager = BackupManager::from_config(&tmp.config);

    let handle = backup_actor::spawn(BackupArgs {
        db: db.clone(),
        manager: manager.clone(),
        interval: Some(Duration::from_millis(50)),
    })
    .await
    .expect("spawn");

    let mut found = 0;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        found = manager.list_backups().await.expect("list").len();
        if found > 0 {
            break;
        }
    }
    handle.stop();
    assert!(found > 0, "no scheduled backup was written");
    db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_backups_get_distinct_complete_files() {
    let tmp = TempStore::new("backup-overlap");
    let db = tmp.open().await;
    let store = db.store().await.expect("store");
    let manager = BackupManager::new(tmp.config.backup_dir.clone(), 0);
    let live = dump(store).await;

    let mut paths = Vec::new();
    for _ in 0..10 {
        let (a, b) = tokio::join!(manager.create_backup(store), manager.create_backup(store));
        let a = a.expect("first of pair");
        let b = b.expect("second of pair");
        assert_ne!(a, b);
        paths.push(a);
        paths.push(b);
    }

    assert_eq!(manager.list_backups().await.expect("list").len(), paths.len());
    for path in &paths {
        let mut cfg = tmp.config.clone();
        cfg.path = path.clone();
        let copy = SqliteStore::connect(&cfg).await.expect("open backup");
        assert_eq!(dump(&copy).await, live, "{}", path.display());
        copy.close().await;
    }
    db.close().await;
}
