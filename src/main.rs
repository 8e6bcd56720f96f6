use anuset_store::service::backup_actor::{self, BackupArgs};
use anuset_store::{BackupManager, Config, Database, Repository};
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let dbcfg = &cfg.database;
    info!(
        path = %dbcfg.path.display(),
        backup_dir = %dbcfg.backup_dir.display(),
        migrations_dir = %dbcfg.migrations_dir.display(),
        backup_enabled = dbcfg.backup_enabled,
        max_backups = dbcfg.max_backups,
        loglevel = %cfg.loglevel
    );

    let db = Database::setup(dbcfg.clone()).await?;
    let repo = Repository::new(db.clone());

    match repo.get_user(anuset_store::db::schema::DEFAULT_USERNAME).await {
        Ok(Some(user)) => info!(id = user.id, username = %user.username, "store ready"),
        Ok(None) => warn!("store ready but default user is missing"),
        Err(e) => warn!(error = %e, "failed to read default user"),
    }

    let backups = backup_actor::spawn(BackupArgs {
        db: db.clone(),
        manager: BackupManager::from_config(dbcfg),
        interval: dbcfg.backup_interval(),
    })
    .await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    backups.stop();
    db.close().await;
    Ok(())
}
