mod common;

use anuset_store::db::schema::DEFAULT_USERNAME;
use anuset_store::db::{Column, Table, Value};
use anuset_store::{Database, Repository, StoreError};
use common::TempStore;
use serde_json::json;

fn kali() -> Vec<(Column, Value)> {
    vec![(Column::Username, Value::from(DEFAULT_USERNAME))]
}

#[tokio::test]
async fn initialize_twice_keeps_a_single_default_user() {
    let tmp = TempStore::new("init-twice");
    let db = tmp.open().await;
    let store = db.store().await.expect("store");

    store.initialize().await.expect("second initialize");
    store.init_schema().await.expect("third schema pass");

    assert_eq!(store.count(Table::Users, &kali()).await.expect("count"), 1);
    db.close().await;
}

#[tokio::test]
async fn reopening_an_existing_store_does_not_reseed() {
    let tmp = TempStore::new("reopen");
    let first = tmp.open().await;
    first.close().await;

    let second = tmp.open().await;
    let store = second.store().await.expect("store");
    assert_eq!(store.count(Table::Users, &kali()).await.expect("count"), 1);
    assert_eq!(store.count(Table::Users, &vec![]).await.expect("count"), 1);
    second.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_startups_seed_once() {
    let tmp = TempStore::new("concurrent-startup");
    let a = tmp.database();
    let b = tmp.database();

    let (ra, rb) = tokio::join!(a.store(), b.store());
    ra.expect("first startup");
    rb.expect("second startup");

    let store = a.store().await.expect("store");
    assert_eq!(store.count(Table::Users, &kali()).await.expect("count"), 1);
    a.close().await;
    b.close().await;
}

#[tokio::test]
async fn default_user_matches_seed() {
    let tmp = TempStore::new("seed");
    let db = tmp.open().await;
    let repo = Repository::new(db.clone());

    let user = repo
        .get_user(DEFAULT_USERNAME)
        .await
        .expect("get_user")
        .expect("default user present");
    assert_eq!(user.email.as_deref(), Some("kali@anuset.local"));
    assert_eq!(user.settings, json!({"theme": "dark", "language": "es"}));
    assert!(user.last_login.is_none());
    db.close().await;
}

#[tokio::test]
async fn handle_opens_lazily_and_closes_idempotently() {
    let tmp = TempStore::new("lifecycle");
    let db = tmp.database();
    assert!(!db.is_open());
    assert!(!tmp.config.path.exists());

    // never opened
    db.close().await;

    db.store().await.expect("lazy open");
    assert!(db.is_open());
    assert!(tmp.config.path.exists());

    let clone = db.clone();
    clone.close().await;
    assert!(!db.is_open());
    db.close().await;
}

#[tokio::test]
async fn unopenable_path_is_storage_unavailable() {
    let tmp = TempStore::new("unavailable");
    std::fs::create_dir_all(&tmp.root).expect("create root");
    let blocker = tmp.root.join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");

    let mut cfg = tmp.config.clone();
    cfg.path = blocker.join("database.sqlite");

    match Database::setup(cfg).await {
        Err(StoreError::StorageUnavailable(_)) => {}
        Err(other) => panic!("expected StorageUnavailable, got {other:?}"),
        Ok(_) => panic!("expected StorageUnavailable, store opened"),
    }
}
