//! Reconciliation engine.
//!
//! Sequences the remote store, the local cache and the lookup provider for
//! the five caller-facing workflows. Remote reads fall back to the cache;
//! remote writes are never recovered, and the cache is only touched after
//! the remote write succeeded.

use crate::db::EntityStore;
use crate::error::SyncError;
use crate::model::{ReconcileMode, WorkPlace, Workflow};
use crate::places::PlaceLookup;
use crate::remote::{RemoteWorkPlaces, RemoveOutcome};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

pub type WorkflowResult = Result<Vec<WorkPlace>, SyncError>;

/// Latest terminal result of one workflow; `None` until it first completes.
pub type ResultReceiver = watch::Receiver<Option<WorkflowResult>>;

struct ResultChannels {
    fetch_all: watch::Sender<Option<WorkflowResult>>,
    fetch_saved: watch::Sender<Option<WorkflowResult>>,
    create: watch::Sender<Option<WorkflowResult>>,
    save: watch::Sender<Option<WorkflowResult>>,
    remove: watch::Sender<Option<WorkflowResult>>,
}

impl ResultChannels {
    fn new() -> Self {
        Self {
            fetch_all: watch::channel(None).0,
            fetch_saved: watch::channel(None).0,
            create: watch::channel(None).0,
            save: watch::channel(None).0,
            remove: watch::channel(None).0,
        }
    }

    fn sender(&self, workflow: Workflow) -> &watch::Sender<Option<WorkflowResult>> {
        match workflow {
            Workflow::FetchAll => &self.fetch_all,
            Workflow::FetchSaved => &self.fetch_saved,
            Workflow::Create => &self.create,
            Workflow::Save => &self.save,
            Workflow::Remove => &self.remove,
        }
    }
}

pub struct WorkPlaceRepository {
    remote: RemoteWorkPlaces,
    local: EntityStore,
    lookup: PlaceLookup,
    reconcile: ReconcileMode,
    channels: ResultChannels,
}

impl WorkPlaceRepository {
    pub fn new(remote: RemoteWorkPlaces, local: EntityStore, lookup: PlaceLookup) -> Self {
        Self {
            remote,
            local,
            lookup,
            reconcile: ReconcileMode::default(),
            channels: ResultChannels::new(),
        }
    }

    pub fn with_reconcile_mode(mut self, mode: ReconcileMode) -> Self {
        self.reconcile = mode;
        self
    }

    pub fn local(&self) -> &EntityStore {
        &self.local
    }

    /// Follow the terminal results of `workflow`. Results of other workflows
    /// are never delivered here.
    pub fn subscribe(&self, workflow: Workflow) -> ResultReceiver {
        self.channels.sender(workflow).subscribe()
    }

    fn publish(&self, workflow: Workflow, result: WorkflowResult) {
        debug!(workflow = workflow.as_str(), ok = result.is_ok(), "publishing result");
        self.channels.sender(workflow).send_replace(Some(result));
    }

    fn publish_one(&self, workflow: Workflow, result: &Result<WorkPlace, SyncError>) {
        let list = match result {
            Ok(place) => Ok(vec![place.clone()]),
            Err(err) => Err(err.clone()),
        };
        self.publish(workflow, list);
    }

    /// Every known workplace: the remote list mirrored into the cache, or the
    /// cached list when the remote is slow or unreachable.
    #[instrument(skip_all)]
    pub async fn fetch_all(&self) -> WorkflowResult {
        let result = match self.remote.fetch_all().await {
            Ok(places) => {
                let count = places.len();
                let persisted = self.local.upsert_all(places).await.map_err(SyncError::from);
                if persisted.is_ok() {
                    info!(count, "work places mirrored from remote");
                }
                persisted
            }
            Err(err) => {
                warn!(%err, "remote fetch failed; serving cached work places");
                self.local.get_all().await.map_err(SyncError::from)
            }
        };
        self.publish(Workflow::FetchAll, result.clone());
        result
    }

    /// `uid`'s saved workplaces as seen by the cache after applying the
    /// remote saved-set, or as cached when the remote is slow or unreachable.
    #[instrument(skip(self))]
    pub async fn fetch_saved(&self, uid: &str) -> WorkflowResult {
        let result = self.run_fetch_saved(uid).await;
        self.publish(Workflow::FetchSaved, result.clone());
        result
    }

    async fn run_fetch_saved(&self, uid: &str) -> WorkflowResult {
        match self.remote.fetch_saved_keys(uid).await {
            Ok(keys) => {
                let stamped = match self.reconcile {
                    ReconcileMode::Additive => self.local.stamp_saved_keys(keys).await?,
                    ReconcileMode::Authoritative => self.local.replace_saved_keys(keys).await?,
                };
                info!(stamped, mode = self.reconcile.as_str(), "saved keys applied");
            }
            Err(err) => {
                warn!(%err, "remote saved-key fetch failed; serving cached saved work places");
            }
        }
        Ok(self.local.get_saved().await?)
    }

    /// Resolve `name`, create it remotely, then cache it.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str, outside: bool) -> Result<WorkPlace, SyncError> {
        let result = self.run_create(name, outside).await;
        self.publish_one(Workflow::Create, &result);
        result
    }

    async fn run_create(&self, name: &str, outside: bool) -> Result<WorkPlace, SyncError> {
        let resolved = self.lookup.resolve(name, outside).await?;
        let created = self.remote.create(&resolved).await?;
        let stored = self.local.upsert_one(created).await?;
        info!(key = ?stored.key(), "work place created");
        Ok(stored)
    }

    /// Add `place` to `uid`'s saved-set, then flag it in the cache.
    #[instrument(skip(self, place), fields(key = ?place.key()))]
    pub async fn save(&self, uid: &str, place: &WorkPlace) -> Result<WorkPlace, SyncError> {
        let result = self.run_save(uid, place).await;
        self.publish_one(Workflow::Save, &result);
        result
    }

    async fn run_save(&self, uid: &str, place: &WorkPlace) -> Result<WorkPlace, SyncError> {
        self.remote.save(uid, place).await?;
        Ok(self.local.set_saved_flag(place, true).await?)
    }

    /// Drop one entry for `place` from `uid`'s saved-set, then clear its flag
    /// in the cache.
    ///
    /// `Ok(None)` means the saved-set held no entry for `place`: nothing was
    /// changed and nothing is published.
    #[instrument(skip(self, place), fields(key = ?place.key()))]
    pub async fn remove(&self, uid: &str, place: &WorkPlace) -> Result<Option<WorkPlace>, SyncError> {
        let result = self.run_remove(uid, place).await;
        match &result {
            Ok(Some(removed)) => self.publish(Workflow::Remove, Ok(vec![removed.clone()])),
            Ok(None) => {}
            Err(err) => self.publish(Workflow::Remove, Err(err.clone())),
        }
        result
    }

    async fn run_remove(&self, uid: &str, place: &WorkPlace) -> Result<Option<WorkPlace>, SyncError> {
        match self.remote.remove(uid, place).await? {
            RemoveOutcome::Removed => Ok(Some(self.local.set_saved_flag(place, false).await?)),
            RemoveOutcome::NoMatch => {
                warn!("no saved entry matched; nothing removed");
                Ok(None)
            }
        }
    }
}
