//! External lookup: turns a free-text place name into an unkeyed `WorkPlace`.
//!
//! Resolution is autocomplete, then details for the first candidate, then the
//! first photo (or a bundled placeholder when the place has none).

pub mod google;

use crate::error::TransportError;
use crate::model::WorkPlace;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub use google::GooglePlacesClient;

pub const DEFAULT_PHOTO_MAX_WIDTH: u32 = 800;
pub const DEFAULT_PHOTO_MAX_HEIGHT: u32 = 600;

static PLACEHOLDER_IMAGE: &[u8] = include_bytes!("../../assets/no_image.png");

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceCandidate {
    pub place_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRef {
    /// Resource name, e.g. `places/{id}/photos/{ref}`.
    pub name: String,
    pub width_px: Option<u32>,
    pub height_px: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDetails {
    pub id: String,
    pub display_name: String,
    pub formatted_address: String,
    pub location: Option<LatLng>,
    pub photos: Vec<PhotoRef>,
}

#[async_trait]
pub trait PlacesTransport: Send + Sync {
    /// Ranked candidates for a free-text query; may be empty.
    async fn autocomplete(&self, query: &str) -> Result<Vec<PlaceCandidate>, TransportError>;

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, TransportError>;

    /// Image bytes scaled to fit within `max_width` x `max_height`.
    async fn place_photo(
        &self,
        photo: &PhotoRef,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<u8>, TransportError>;
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no place matches '{0}'")]
    NotFound(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Clone)]
pub struct PlaceLookup {
    transport: Arc<dyn PlacesTransport>,
    photo_max_width: u32,
    photo_max_height: u32,
}

impl PlaceLookup {
    pub fn new(transport: Arc<dyn PlacesTransport>) -> Self {
        Self {
            transport,
            photo_max_width: DEFAULT_PHOTO_MAX_WIDTH,
            photo_max_height: DEFAULT_PHOTO_MAX_HEIGHT,
        }
    }

    pub fn with_photo_bounds(mut self, max_width: u32, max_height: u32) -> Self {
        self.photo_max_width = max_width;
        self.photo_max_height = max_height;
        self
    }

    /// Resolve `name` to a workplace without a key.
    #[instrument(skip(self))]
    pub async fn resolve(&self, name: &str, outside: bool) -> Result<WorkPlace, LookupError> {
        let query = name.trim();
        if query.is_empty() {
            return Err(LookupError::NotFound(name.to_string()));
        }

        let candidates = self.transport.autocomplete(query).await?;
        let Some(candidate) = candidates.into_iter().next() else {
            info!("autocomplete returned no candidates");
            return Err(LookupError::NotFound(query.to_string()));
        };
        debug!(place_id = %candidate.place_id, description = %candidate.description, "using first candidate");

        let details = self.transport.place_details(&candidate.place_id).await?;
        let Some(location) = details.location else {
            info!(place_id = %details.id, "place has no coordinates");
            return Err(LookupError::NotFound(query.to_string()));
        };

        let image = match details.photos.first() {
            Some(photo) => {
                let bytes = self
                    .transport
                    .place_photo(photo, self.photo_max_width, self.photo_max_height)
                    .await?;
                if bytes.is_empty() {
                    PLACEHOLDER_IMAGE.to_vec()
                } else {
                    bytes
                }
            }
            None => {
                debug!("place has no photos; using placeholder");
                PLACEHOLDER_IMAGE.to_vec()
            }
        };

        let mut place = WorkPlace::new(
            details.display_name,
            details.formatted_address,
            location.latitude,
            location.longitude,
            outside,
        );
        place.photo_encoding = Some(STANDARD.encode(image));
        Ok(place)
    }
}

/// Base64 of the bundled placeholder image.
pub fn placeholder_encoding() -> String {
    STANDARD.encode(PLACEHOLDER_IMAGE)
}
