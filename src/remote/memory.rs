//! In-process `RealtimeTransport` backed by a JSON tree.
//!
//! Used by the test suites and for running the CLI without a backend. Reads
//! can be slowed down and the whole store can be taken offline to exercise
//! the timeout and fallback paths.

use super::push_id::PushKeyGenerator;
use super::RealtimeTransport;
use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct MemoryTransport {
    tree: Mutex<Value>,
    offline: AtomicBool,
    read_latency: Mutex<Option<Duration>>,
    writes: AtomicUsize,
    keys: PushKeyGenerator,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tree(tree: Value) -> Self {
        Self {
            tree: Mutex::new(tree),
            ..Self::default()
        }
    }

    /// While offline every operation fails with `TransportError::Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay applied to every read before it is answered.
    pub fn set_read_latency(&self, latency: Option<Duration>) {
        *self
            .read_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = latency;
    }

    /// Number of successful writes and deletes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Synchronous view of the node at `path`.
    pub fn snapshot(&self, path: &str) -> Value {
        get_at(&self.lock_tree(), path)
    }

    /// Synchronous overwrite of the node at `path`, bypassing offline mode.
    pub fn seed(&self, path: &str, value: Value) {
        set_at(&mut self.lock_tree(), path, value);
    }

    fn lock_tree(&self) -> std::sync::MutexGuard<'_, Value> {
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("remote store is offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RealtimeTransport for MemoryTransport {
    async fn read(&self, path: &str) -> Result<Value, TransportError> {
        let latency = *self
            .read_latency
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_online()?;
        Ok(self.snapshot(path))
    }

    async fn write(&self, path: &str, value: &Value) -> Result<(), TransportError> {
        self.check_online()?;
        set_at(&mut self.lock_tree(), path, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), TransportError> {
        self.check_online()?;
        delete_at(&mut self.lock_tree(), path);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn push_key(&self) -> String {
        self.keys.next_key()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn get_at(tree: &Value, path: &str) -> Value {
    let mut node = tree;
    for segment in segments(path) {
        match node.get(segment) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

/// Walks `path`, turning scalar or missing nodes on the way into objects.
fn set_at(tree: &mut Value, path: &str, value: Value) {
    let mut node = tree;
    for segment in segments(path) {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map.entry(segment.to_string()).or_insert(Value::Null);
    }
    *node = value;
}

fn delete_at(tree: &mut Value, path: &str) {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        *tree = Value::Null;
        return;
    };
    let mut node = tree;
    for segment in parents {
        match node.get_mut(*segment) {
            Some(child) => node = child,
            None => return,
        }
    }
    if let Value::Object(map) = node {
        map.remove(*last);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn write_read_delete() {
        let transport = MemoryTransport::new();
        transport.write("a/b/c", &json!("v")).await.unwrap();
        assert_eq!(transport.read("a/b").await.unwrap(), json!({ "c": "v" }));
        assert_eq!(transport.read("a/x").await.unwrap(), Value::Null);

        transport.delete("a/b/c").await.unwrap();
        transport.delete("a/missing/c").await.unwrap();
        assert_eq!(transport.read("a/b/c").await.unwrap(), Value::Null);
        assert_eq!(transport.write_count(), 3);
    }

    #[tokio::test]
    async fn offline_fails_every_operation() {
        let transport = MemoryTransport::with_tree(json!({ "a": 1 }));
        transport.set_offline(true);
        assert!(matches!(transport.read("a").await, Err(TransportError::Unavailable(_))));
        assert!(transport.write("a", &json!(2)).await.is_err());
        assert!(transport.delete("a").await.is_err());
        assert_eq!(transport.snapshot("a"), json!(1));

        transport.set_offline(false);
        assert_eq!(transport.read("a").await.unwrap(), json!(1));
    }

    #[test]
    fn set_replaces_scalar_parents() {
        let mut tree = json!({ "a": 5 });
        set_at(&mut tree, "a/b", json!(true));
        assert_eq!(tree, json!({ "a": { "b": true } }));
    }

    #[test]
    fn set_on_scalar_root_builds_objects() {
        let mut tree = json!("leaf");
        set_at(&mut tree, "/x/y/", json!(1));
        assert_eq!(tree, json!({ "x": { "y": 1 } }));

        set_at(&mut tree, "", json!(null));
        assert_eq!(tree, Value::Null);
    }

    #[test]
    fn seed_bypasses_offline_mode() {
        let transport = MemoryTransport::new();
        transport.set_offline(true);
        transport.seed("workplaces/k1", json!({ "name": "Library" }));
        assert_eq!(transport.snapshot("workplaces/k1/name"), json!("Library"));
        assert_eq!(transport.write_count(), 0);
    }
}
