use super::repo::{self, Pool};
use super::StoreError;
use crate::model::WorkPlace;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

const WRITE_QUEUE_CAPACITY: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, StoreError>>;

enum WriteCommand {
    UpsertAll {
        places: Vec<WorkPlace>,
        respond_to: Reply<Vec<WorkPlace>>,
    },
    UpsertOne {
        place: WorkPlace,
        respond_to: Reply<WorkPlace>,
    },
    SetSaved {
        key: String,
        saved: bool,
        respond_to: Reply<u64>,
    },
    StampSaved {
        keys: Vec<String>,
        respond_to: Reply<u64>,
    },
    ReplaceSaved {
        keys: Vec<String>,
        respond_to: Reply<u64>,
    },
}

/// Handle to the task that owns every write against the workplace table.
///
/// Commands are applied one at a time in arrival order. Cloning the handle
/// shares the same task.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::Sender<WriteCommand>,
}

impl WriteHandle {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(pool: Pool) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteCommand>(WRITE_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                apply(&pool, command).await;
            }
            debug!("entity store writer stopped");
        });
        Self { tx }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> WriteCommand,
    ) -> Result<T, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(build(respond_to))
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        response.await.map_err(|_| StoreError::WriterClosed)?
    }

    pub async fn upsert_all(&self, places: Vec<WorkPlace>) -> Result<Vec<WorkPlace>, StoreError> {
        self.request(|respond_to| WriteCommand::UpsertAll { places, respond_to })
            .await
    }

    pub async fn upsert_one(&self, place: WorkPlace) -> Result<WorkPlace, StoreError> {
        self.request(|respond_to| WriteCommand::UpsertOne { place, respond_to })
            .await
    }

    pub async fn set_saved(&self, key: String, saved: bool) -> Result<u64, StoreError> {
        self.request(|respond_to| WriteCommand::SetSaved {
            key,
            saved,
            respond_to,
        })
        .await
    }

    pub async fn stamp_saved(&self, keys: Vec<String>) -> Result<u64, StoreError> {
        self.request(|respond_to| WriteCommand::StampSaved { keys, respond_to })
            .await
    }

    pub async fn replace_saved(&self, keys: Vec<String>) -> Result<u64, StoreError> {
        self.request(|respond_to| WriteCommand::ReplaceSaved { keys, respond_to })
            .await
    }
}

async fn apply(pool: &Pool, command: WriteCommand) {
    match command {
        WriteCommand::UpsertAll { places, respond_to } => {
            let result = match repo::upsert_work_places(pool, &places).await {
                Ok(persisted) => Ok(persisted),
                Err(err) => {
                    // A failed bulk write leaves the cache untrusted: drop it all.
                    warn!(?err, count = places.len(), "bulk upsert failed; wiping work place cache");
                    if let Err(wipe_err) = repo::clear_work_places(pool).await {
                        error!(?wipe_err, "failed to wipe work place cache");
                    }
                    Err(err)
                }
            };
            let _ = respond_to.send(result);
        }
        WriteCommand::UpsertOne { place, respond_to } => {
            let _ = respond_to.send(repo::upsert_work_place(pool, &place).await);
        }
        WriteCommand::SetSaved {
            key,
            saved,
            respond_to,
        } => {
            let _ = respond_to.send(repo::set_saved_flag(pool, &key, saved).await);
        }
        WriteCommand::StampSaved { keys, respond_to } => {
            let _ = respond_to.send(repo::stamp_saved_keys(pool, &keys).await);
        }
        WriteCommand::ReplaceSaved { keys, respond_to } => {
            let _ = respond_to.send(repo::replace_saved_keys(pool, &keys).await);
        }
    }
}
