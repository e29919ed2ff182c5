//! Authoritative remote store.
//!
//! The remote is a JSON tree addressed by slash-separated paths:
//! - `workplaces/{key}` holds every workplace record.
//! - `saved/{uid}/saved-work-places/{pushKey}` holds one saved workplace key
//!   per child, appended with chronologically sortable push keys.
//!
//! `RealtimeTransport` is the seam to the wire; `RemoteWorkPlaces` layers the
//! workplace operations and fetch deadlines on top of it.

pub mod firebase;
pub mod memory;
pub mod push_id;

use crate::error::TransportError;
use crate::model::WorkPlace;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use firebase::FirebaseClient;
pub use memory::MemoryTransport;

pub const WORKPLACES_ROOT: &str = "workplaces";
pub const SAVED_ROOT: &str = "saved";
pub const USER_SAVED_LOCATION: &str = "saved-work-places";

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_SAVED_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw access to the remote JSON tree.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Read the node at `path`. Absent nodes read as `Value::Null`.
    async fn read(&self, path: &str) -> Result<Value, TransportError>;

    /// Overwrite the node at `path`.
    async fn write(&self, path: &str, value: &Value) -> Result<(), TransportError>;

    /// Delete the node at `path`. Deleting an absent node succeeds.
    async fn delete(&self, path: &str) -> Result<(), TransportError>;

    /// A fresh child key that sorts after every key this transport issued before.
    fn push_key(&self) -> String;
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("work place has no key")]
    MissingKey,
    #[error("invalid path segment '{0}'")]
    InvalidPath(String),
    #[error("failed to encode work place: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NoMatch,
}

#[derive(Clone)]
pub struct RemoteWorkPlaces {
    transport: Arc<dyn RealtimeTransport>,
    fetch_timeout: Duration,
    saved_fetch_timeout: Duration,
}

impl RemoteWorkPlaces {
    pub fn new(transport: Arc<dyn RealtimeTransport>) -> Self {
        Self {
            transport,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            saved_fetch_timeout: DEFAULT_SAVED_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, fetch_all: Duration, fetch_saved: Duration) -> Self {
        self.fetch_timeout = fetch_all;
        self.saved_fetch_timeout = fetch_saved;
        self
    }

    async fn read_within(&self, path: &str, deadline: Duration) -> Result<Value, RemoteError> {
        match tokio::time::timeout(deadline, self.transport.read(path)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(RemoteError::Timeout(deadline)),
        }
    }

    /// Every workplace record in the remote store, in key order.
    #[instrument(skip_all)]
    pub async fn fetch_all(&self) -> Result<Vec<WorkPlace>, RemoteError> {
        let snapshot = self.read_within(WORKPLACES_ROOT, self.fetch_timeout).await?;
        let places = parse_work_places(snapshot);
        debug!(count = places.len(), "fetched remote work places");
        Ok(places)
    }

    /// The workplace keys in `uid`'s saved-set, oldest first.
    #[instrument(skip(self))]
    pub async fn fetch_saved_keys(&self, uid: &str) -> Result<Vec<String>, RemoteError> {
        let path = saved_path(uid)?;
        let snapshot = self.read_within(&path, self.saved_fetch_timeout).await?;
        let keys = parse_saved_keys(snapshot);
        debug!(count = keys.len(), "fetched remote saved keys");
        Ok(keys)
    }

    /// Write `place` under a freshly generated key and return it with that key.
    #[instrument(skip_all, fields(name = %place.name))]
    pub async fn create(&self, place: &WorkPlace) -> Result<WorkPlace, RemoteError> {
        let key = self.transport.push_key();
        let created = place.clone().with_key(key.clone()).with_saved(false);
        let record = serde_json::to_value(&created)?;
        self.transport
            .write(&format!("{WORKPLACES_ROOT}/{key}"), &record)
            .await?;
        info!(key = %key, "work place created remotely");
        Ok(created)
    }

    /// Append `place`'s key to `uid`'s saved-set.
    #[instrument(skip(self, place), fields(key = ?place.key()))]
    pub async fn save(&self, uid: &str, place: &WorkPlace) -> Result<(), RemoteError> {
        let key = place.key().ok_or(RemoteError::MissingKey)?;
        let path = format!("{}/{}", saved_path(uid)?, self.transport.push_key());
        self.transport
            .write(&path, &Value::String(key.to_string()))
            .await?;
        Ok(())
    }

    /// Delete the oldest child of `uid`'s saved-set whose value is `place`'s key.
    #[instrument(skip(self, place), fields(key = ?place.key()))]
    pub async fn remove(&self, uid: &str, place: &WorkPlace) -> Result<RemoveOutcome, RemoteError> {
        let key = place.key().ok_or(RemoteError::MissingKey)?;
        let path = saved_path(uid)?;
        let snapshot = self.transport.read(&path).await?;
        let Some(child) = children(snapshot)
            .into_iter()
            .find(|(_, value)| value.as_str() == Some(key))
            .map(|(child, _)| child)
        else {
            return Ok(RemoveOutcome::NoMatch);
        };
        self.transport.delete(&format!("{path}/{child}")).await?;
        Ok(RemoveOutcome::Removed)
    }
}

fn saved_path(uid: &str) -> Result<String, RemoteError> {
    let forbidden = ['/', '.', '#', '$', '[', ']'];
    if uid.trim().is_empty() || uid.contains(forbidden) {
        return Err(RemoteError::InvalidPath(uid.to_string()));
    }
    Ok(format!("{SAVED_ROOT}/{uid}/{USER_SAVED_LOCATION}"))
}

/// Children of a snapshot sorted by child key. Arrays appear when the
/// children happen to be small integers; holes are skipped.
fn children(snapshot: Value) -> Vec<(String, Value)> {
    let mut nodes: Vec<(String, Value)> = match snapshot {
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter(|(_, value)| !value.is_null())
            .map(|(index, value)| (index.to_string(), value))
            .collect(),
        _ => Vec::new(),
    };
    nodes.sort_by(|a, b| a.0.cmp(&b.0));
    nodes
}

fn parse_work_places(snapshot: Value) -> Vec<WorkPlace> {
    children(snapshot)
        .into_iter()
        .filter_map(|(child, value)| match serde_json::from_value::<WorkPlace>(value) {
            Ok(place) if place.key().is_some() => Some(place),
            Ok(place) => Some(place.with_key(child)),
            Err(err) => {
                warn!(child = %child, %err, "skipping malformed work place record");
                None
            }
        })
        .collect()
}

fn parse_saved_keys(snapshot: Value) -> Vec<String> {
    children(snapshot)
        .into_iter()
        .filter_map(|(child, value)| match value {
            Value::String(key) if !key.is_empty() => Some(key),
            _ => {
                warn!(child = %child, "skipping non-string saved entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote_with(tree: Value) -> (Arc<MemoryTransport>, RemoteWorkPlaces) {
        let transport = Arc::new(MemoryTransport::with_tree(tree));
        let remote = RemoteWorkPlaces::new(transport.clone());
        (transport, remote)
    }

    #[tokio::test]
    async fn fetch_all_parses_children_in_key_order() {
        let (_, remote) = remote_with(json!({
            "workplaces": {
                "b": { "firebaseKey": "b", "name": "Beta", "address": "2 St", "latitude": 2.0, "longitude": 2.0 },
                "a": { "name": "Alpha", "address": "1 St", "latitude": 1.0, "longitude": 1.0, "outside": true },
                "bad": "not a record"
            }
        }));

        let places = remote.fetch_all().await.unwrap();
        let keys: Vec<_> = places.iter().map(|p| p.key().unwrap()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(places[0].outside);
        assert!(places.iter().all(|p| !p.saved));
    }

    #[tokio::test]
    async fn fetch_all_of_empty_store_is_empty() {
        let (_, remote) = remote_with(Value::Null);
        assert!(remote.fetch_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_all_times_out() {
        let (transport, remote) = remote_with(json!({ "workplaces": {} }));
        let remote = remote.with_timeouts(Duration::from_millis(20), Duration::from_millis(20));
        transport.set_read_latency(Some(Duration::from_secs(30)));

        let err = remote.fetch_all().await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn create_then_save_then_remove() {
        let (transport, remote) = remote_with(Value::Null);
        let draft = WorkPlace::new("Library", "Main St 1", 45.0, 9.0, false);

        let created = remote.create(&draft).await.unwrap();
        let key = created.key().unwrap().to_string();
        assert_eq!(
            transport.snapshot(&format!("workplaces/{key}"))["name"],
            "Library"
        );
        assert_eq!(transport.snapshot(&format!("workplaces/{key}"))["firebaseKey"], key);

        remote.save("u1", &created).await.unwrap();
        remote.save("u1", &created).await.unwrap();
        assert_eq!(remote.fetch_saved_keys("u1").await.unwrap(), vec![key.clone(), key.clone()]);

        assert_eq!(remote.remove("u1", &created).await.unwrap(), RemoveOutcome::Removed);
        assert_eq!(remote.fetch_saved_keys("u1").await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn remove_deletes_oldest_matching_child() {
        let (transport, remote) = remote_with(json!({
            "saved": { "u1": { "saved-work-places": {
                "-N2": "k1",
                "-N1": "k1",
                "-N3": "k2"
            } } }
        }));
        let place = WorkPlace::new("x", "y", 0.0, 0.0, false).with_key("k1");

        assert_eq!(remote.remove("u1", &place).await.unwrap(), RemoveOutcome::Removed);
        let left = transport.snapshot("saved/u1/saved-work-places");
        assert!(left.get("-N1").is_none());
        assert_eq!(left["-N2"], "k1");
    }

    #[tokio::test]
    async fn remove_without_match_is_reported() {
        let (_, remote) = remote_with(json!({
            "saved": { "u1": { "saved-work-places": { "-N1": "k2" } } }
        }));
        let place = WorkPlace::new("x", "y", 0.0, 0.0, false).with_key("k1");
        assert_eq!(remote.remove("u1", &place).await.unwrap(), RemoveOutcome::NoMatch);
    }

    #[tokio::test]
    async fn save_requires_key_and_valid_uid() {
        let (_, remote) = remote_with(Value::Null);
        let unkeyed = WorkPlace::new("x", "y", 0.0, 0.0, false);
        assert!(matches!(remote.save("u1", &unkeyed).await, Err(RemoteError::MissingKey)));

        let keyed = unkeyed.with_key("k1");
        assert!(matches!(remote.save("a/b", &keyed).await, Err(RemoteError::InvalidPath(_))));
        assert!(matches!(remote.save("  ", &keyed).await, Err(RemoteError::InvalidPath(_))));
    }

    #[test]
    fn saved_keys_tolerate_array_snapshots() {
        let keys = parse_saved_keys(json!([null, "k1", 7, "k2"]));
        assert_eq!(keys, vec!["k1", "k2"]);
    }
}
