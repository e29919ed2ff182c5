use super::repo::{self, Pool};
use super::writer::WriteHandle;
use super::StoreError;
use crate::model::WorkPlace;
use tracing::{instrument, warn};

/// The local workplace cache.
///
/// Cheap to clone; clones share the pool and the writer task.
#[derive(Clone)]
pub struct EntityStore {
    pool: Pool,
    writer: WriteHandle,
}

impl EntityStore {
    /// Open (or create) the database at `database_url` and apply migrations.
    pub async fn open(database_url: &str) -> Result<Self, StoreError> {
        let pool = repo::init_pool(database_url).await?;
        repo::run_migrations(&pool).await?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an already migrated pool. Must be called inside a tokio runtime.
    pub fn from_pool(pool: Pool) -> Self {
        let writer = WriteHandle::spawn(pool.clone());
        Self { pool, writer }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub async fn get_all(&self) -> Result<Vec<WorkPlace>, StoreError> {
        repo::all_work_places(&self.pool).await
    }

    pub async fn get_saved(&self) -> Result<Vec<WorkPlace>, StoreError> {
        repo::saved_work_places(&self.pool).await
    }

    pub async fn find(&self, key: &str) -> Result<Option<WorkPlace>, StoreError> {
        repo::find_work_place(&self.pool, key).await
    }

    /// Replace-on-conflict bulk write. On failure the whole table is cleared
    /// before the error is returned.
    pub async fn upsert_all(&self, places: Vec<WorkPlace>) -> Result<Vec<WorkPlace>, StoreError> {
        self.writer.upsert_all(places).await
    }

    pub async fn upsert_one(&self, place: WorkPlace) -> Result<WorkPlace, StoreError> {
        self.writer.upsert_one(place).await
    }

    /// Update the `saved` column of exactly one row.
    #[instrument(skip_all, fields(saved = saved))]
    pub async fn set_saved_flag(
        &self,
        place: &WorkPlace,
        saved: bool,
    ) -> Result<WorkPlace, StoreError> {
        let key = place.key().ok_or(StoreError::MissingKey)?;
        let updated = self.writer.set_saved(key.to_string(), saved).await?;
        if updated == 0 {
            warn!(key, "work place is not cached; saved flag not persisted");
        }
        Ok(place.clone().with_saved(saved))
    }

    /// Additive reconciliation: flags only ever turn on.
    pub async fn stamp_saved_keys(&self, keys: Vec<String>) -> Result<u64, StoreError> {
        self.writer.stamp_saved(keys).await
    }

    /// Authoritative reconciliation: flags end up matching `keys` exactly.
    pub async fn replace_saved_keys(&self, keys: Vec<String>) -> Result<u64, StoreError> {
        self.writer.replace_saved(keys).await
    }
}
