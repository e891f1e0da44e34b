//! Address to coordinate lookup.
//!
//! `GEOCODER_BACKEND` picks the implementation: `mock` hashes addresses to
//! stable points around the depot, `google` calls the Geocoding API.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;
use crate::models::location::{GeoPoint, NamedLocation};

#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service has no match for the address.
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, AppError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: GeoPoint,
}

pub struct GoogleGeocoder {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: impl Into<String>, timeout: std::time::Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, AppError> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalService(format!(
                "geocoding service returned {}",
                response.status()
            )));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|err| AppError::ExternalService(format!("malformed geocoding response: {err}")))?;

        match body.status.as_str() {
            "OK" => Ok(body
                .results
                .into_iter()
                .next()
                .map(|result| result.geometry.location)),
            "ZERO_RESULTS" => Ok(None),
            status => {
                let detail = body.error_message.unwrap_or_default();
                warn!(address = %address, status = %status, detail = %detail, "geocoding failed");
                Err(AppError::ExternalService(
                    format!("geocoding failed: {status} {detail}").trim().to_string(),
                ))
            }
        }
    }

    fn name(&self) -> &'static str {
        "google"
    }
}

/// Deterministic geocoder for development and tests: the same address always
/// lands on the same point within ~0.1 degrees of the anchor.
pub struct MockGeocoder {
    anchor: NamedLocation,
    unresolvable: HashSet<String>,
}

impl MockGeocoder {
    pub fn new(anchor: NamedLocation) -> Self {
        Self {
            anchor,
            unresolvable: HashSet::new(),
        }
    }

    /// Addresses that should come back without a match.
    pub fn with_unresolvable<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unresolvable
            .extend(addresses.into_iter().map(Into::into));
        self
    }

    fn hash_to_point(&self, address: &str) -> GeoPoint {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        address.trim().to_lowercase().hash(&mut hasher);
        let hash = hasher.finish();

        let lat_offset = ((hash >> 32) as f64 / u32::MAX as f64) - 0.5;
        let lng_offset = ((hash & 0xFFFF_FFFF) as f64 / u32::MAX as f64) - 0.5;

        GeoPoint {
            lat: self.anchor.lat + lat_offset * 0.2,
            lng: self.anchor.lng + lng_offset * 0.2,
        }
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<GeoPoint>, AppError> {
        if address.trim().is_empty() || self.unresolvable.contains(address.trim()) {
            return Ok(None);
        }
        Ok(Some(self.hash_to_point(address)))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
