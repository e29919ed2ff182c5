use super::{LatLng, PhotoRef, PlaceCandidate, PlaceDetails, PlacesTransport};
use crate::config::Config;
use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::{debug, info};

const PLACES_API_BASE: &str = "https://places.googleapis.com/";
const DETAILS_FIELD_MASK: &str = "id,displayName,formattedAddress,location,photos";

/// Places API (New) client.
#[derive(Clone)]
pub struct GooglePlacesClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for GooglePlacesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GooglePlacesClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GooglePlacesClient {
    pub fn new(api_key: String) -> Result<Self, TransportError> {
        let base_url = Url::parse(PLACES_API_BASE)
            .map_err(|e| TransportError::InvalidUrl(format!("{PLACES_API_BASE}: {e}")))?;
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: Url) -> Result<Self, TransportError> {
        let http = Client::builder()
            .user_agent("workplace-sync/0.1")
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, TransportError> {
        Self::new(cfg.places.api_key.trim().to_string())
    }

    fn join(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))
    }

    pub fn build_autocomplete_request(&self, query: &str) -> Result<reqwest::Request, TransportError> {
        Ok(self
            .http
            .post(self.join("v1/places:autocomplete")?)
            .header("X-Goog-Api-Key", &self.api_key)
            .json(&json!({ "input": query }))
            .build()?)
    }

    pub fn build_details_request(&self, place_id: &str) -> Result<reqwest::Request, TransportError> {
        Ok(self
            .http
            .get(self.join(&format!("v1/places/{place_id}"))?)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", DETAILS_FIELD_MASK)
            .build()?)
    }

    pub fn build_photo_request(
        &self,
        photo: &PhotoRef,
        max_width: u32,
        max_height: u32,
    ) -> Result<reqwest::Request, TransportError> {
        let mut url = self.join(&format!("v1/{}/media", photo.name))?;
        url.query_pairs_mut()
            .append_pair("maxWidthPx", &max_width.to_string())
            .append_pair("maxHeightPx", &max_height.to_string());
        Ok(self
            .http
            .get(url)
            .header("X-Goog-Api-Key", &self.api_key)
            .build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        debug!(method = %request.method(), path = %request.url().path(), "places request");
        let res = self.http.execute(request).await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            info!(%status, "places request failed");
            return Err(TransportError::from_status(status, &body));
        }
        Ok(res)
    }
}

#[async_trait]
impl PlacesTransport for GooglePlacesClient {
    async fn autocomplete(&self, query: &str) -> Result<Vec<PlaceCandidate>, TransportError> {
        let request = self.build_autocomplete_request(query)?;
        let body: AutocompleteResp = self
            .execute(request)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("autocomplete: {e}")))?;
        Ok(body.into_candidates())
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails, TransportError> {
        let request = self.build_details_request(place_id)?;
        let body: PlaceResp = self
            .execute(request)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::InvalidResponse(format!("place {place_id}: {e}")))?;
        Ok(body.into())
    }

    async fn place_photo(
        &self,
        photo: &PhotoRef,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<u8>, TransportError> {
        let request = self.build_photo_request(photo, max_width, max_height)?;
        let bytes = self.execute(request).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[derive(Debug, Deserialize)]
struct AutocompleteResp {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Suggestion {
    place_prediction: Option<PlacePrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlacePrediction {
    place_id: String,
    #[serde(default)]
    text: Option<LocalizedText>,
}

#[derive(Debug, Deserialize)]
struct LocalizedText {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceResp {
    #[serde(default)]
    id: String,
    display_name: Option<LocalizedText>,
    #[serde(default)]
    formatted_address: String,
    location: Option<LocationResp>,
    #[serde(default)]
    photos: Vec<PhotoResp>,
}

#[derive(Debug, Deserialize)]
struct LocationResp {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoResp {
    name: String,
    width_px: Option<u32>,
    height_px: Option<u32>,
}

impl AutocompleteResp {
    /// Query predictions carry no `placePrediction` and are dropped.
    fn into_candidates(self) -> Vec<PlaceCandidate> {
        self.suggestions
            .into_iter()
            .filter_map(|s| s.place_prediction)
            .map(|p| PlaceCandidate {
                place_id: p.place_id,
                description: p.text.map(|t| t.text).unwrap_or_default(),
            })
            .collect()
    }
}

impl From<PlaceResp> for PlaceDetails {
    fn from(resp: PlaceResp) -> Self {
        PlaceDetails {
            id: resp.id,
            display_name: resp.display_name.map(|t| t.text).unwrap_or_default(),
            formatted_address: resp.formatted_address,
            location: resp.location.map(|l| LatLng {
                latitude: l.latitude,
                longitude: l.longitude,
            }),
            photos: resp
                .photos
                .into_iter()
                .map(|p| PhotoRef {
                    name: p.name,
                    width_px: p.width_px,
                    height_px: p.height_px,
                })
                .collect(),
        }
    }
}
