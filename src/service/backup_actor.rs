use crate::db::handle::Database;
use crate::error::StoreError;
use crate::service::backup::BackupManager;

use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Messages handled by the backup actor.
#[derive(Debug)]
pub enum BackupMessage {
    /// Take a backup now and reply with its path.
    CreateBackup(RpcReplyPort<Result<PathBuf, StoreError>>),
    /// Periodic trigger (sent by the actor's own timer).
    Tick,
}

/// Handle for interacting with the backup actor.
#[derive(Clone)]
pub struct BackupHandle {
    actor: ActorRef<BackupMessage>,
}

impl BackupHandle {
    /// Take a backup now, serialized with any scheduled one.
    pub async fn create_backup(&self) -> Result<PathBuf, StoreError> {
        ractor::call!(self.actor, BackupMessage::CreateBackup)
            .map_err(|e| StoreError::ActorError(format!("CreateBackup RPC failed: {e}")))?
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}

struct BackupActorState {
    db: Database,
    manager: BackupManager,
    ticker: Option<JoinHandle<()>>,
}

pub struct BackupArgs {
    pub db: Database,
    pub manager: BackupManager,
    /// `None` disables the timer; backups then only happen on request.
    pub interval: Option<Duration>,
}

struct BackupActor;

#[ractor::async_trait]
impl Actor for BackupActor {
    type Msg = BackupMessage;
    type State = BackupActorState;
    type Arguments = BackupArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let ticker = args.interval.map(|period| {
            info!(
                dir = %args.manager.backup_dir().display(),
                every_secs = period.as_secs(),
                "scheduled backups enabled"
            );
            myself.send_interval(period, || BackupMessage::Tick)
        });

        Ok(BackupActorState {
            db: args.db,
            manager: args.manager,
            ticker,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            BackupMessage::CreateBackup(reply) => {
                let res = run_backup(state).await;
                let _ = reply.send(res);
            }
            BackupMessage::Tick => {
                debug!("scheduled backup tick");
                if let Err(e) = run_backup(state).await {
                    warn!(error = %e, "scheduled backup failed");
                }
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        Ok(())
    }
}

async fn run_backup(state: &BackupActorState) -> Result<PathBuf, StoreError> {
    let store = state.db.store().await?;
    state.manager.create_backup(store).await
}

/// Spawn an (unnamed) backup actor and return a handle.
pub async fn spawn(args: BackupArgs) -> Result<BackupHandle, StoreError> {
    let (actor, _jh) = Actor::spawn(None, BackupActor, args)
        .await
        .map_err(|e| StoreError::ActorError(format!("failed to spawn BackupActor: {e}")))?;
    Ok(BackupHandle { actor })
}
