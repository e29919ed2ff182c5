#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workplace_sync::db::{self, EntityStore};
use workplace_sync::error::TransportError;
use workplace_sync::places::{LatLng, PhotoRef, PlaceCandidate, PlaceDetails, PlaceLookup, PlacesTransport};
use workplace_sync::remote::{MemoryTransport, RemoteWorkPlaces};
use workplace_sync::{ReconcileMode, WorkPlace, WorkPlaceRepository};

pub const FETCH_TIMEOUT: Duration = Duration::from_millis(200);

/// Places transport that answers from queued responses and records queries.
#[derive(Default)]
pub struct RecordingPlaces {
    pub candidates: Mutex<VecDeque<Result<Vec<PlaceCandidate>, TransportError>>>,
    pub details: Mutex<VecDeque<Result<PlaceDetails, TransportError>>>,
    pub queries: Mutex<Vec<String>>,
}

impl RecordingPlaces {
    pub fn push_place(&self, id: &str, name: &str, latitude: f64, longitude: f64) {
        self.candidates.lock().unwrap().push_back(Ok(vec![PlaceCandidate {
            place_id: id.into(),
            description: name.into(),
        }]));
        self.details.lock().unwrap().push_back(Ok(PlaceDetails {
            id: id.into(),
            display_name: name.into(),
            formatted_address: format!("{name} address"),
            location: Some(LatLng { latitude, longitude }),
            photos: Vec::new(),
        }));
    }

    pub fn push_no_candidates(&self) {
        self.candidates.lock().unwrap().push_back(Ok(Vec::new()));
    }

    pub fn push_autocomplete_error(&self, err: TransportError) {
        self.candidates.lock().unwrap().push_back(Err(err));
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlacesTransport for RecordingPlaces {
    async fn autocomplete(&self, query: &str) -> Result<Vec<PlaceCandidate>, TransportError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.candidates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, TransportError> {
        self.details
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::NotFound(place_id.to_string())))
    }

    async fn place_photo(
        &self,
        _photo: &PhotoRef,
        _max_width: u32,
        _max_height: u32,
    ) -> Result<Vec<u8>, TransportError> {
        Ok(vec![0xFF, 0xD8, 0xFF])
    }
}

pub struct Harness {
    pub transport: Arc<MemoryTransport>,
    pub places: Arc<RecordingPlaces>,
    pub store: EntityStore,
    pub repository: WorkPlaceRepository,
}

pub async fn memory_store() -> EntityStore {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    EntityStore::from_pool(pool)
}

pub async fn harness(tree: Value) -> Harness {
    harness_with_mode(tree, ReconcileMode::Additive).await
}

pub async fn harness_with_mode(tree: Value, mode: ReconcileMode) -> Harness {
    let transport = Arc::new(MemoryTransport::with_tree(tree));
    let places = Arc::new(RecordingPlaces::default());
    let store = memory_store().await;
    let remote =
        RemoteWorkPlaces::new(transport.clone()).with_timeouts(FETCH_TIMEOUT, FETCH_TIMEOUT);
    let lookup = PlaceLookup::new(places.clone());
    let repository =
        WorkPlaceRepository::new(remote, store.clone(), lookup).with_reconcile_mode(mode);
    Harness {
        transport,
        places,
        store,
        repository,
    }
}

pub fn record(key: &str, latitude: f64) -> Value {
    json!({
        "firebaseKey": key,
        "name": format!("place {key}"),
        "address": format!("{key} street"),
        "latitude": latitude,
        "longitude": 9.0,
        "outside": false
    })
}

pub fn place(key: &str, latitude: f64) -> WorkPlace {
    WorkPlace::new(format!("place {key}"), format!("{key} street"), latitude, 9.0, false)
        .with_key(key)
}

pub fn keys(places: &[WorkPlace]) -> Vec<String> {
    places
        .iter()
        .filter_map(|p| p.key().map(str::to_string))
        .collect()
}
