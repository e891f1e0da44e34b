//! Backing store for deliveries and drivers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{Delivery, NewDelivery, ETA_UNSET, STATUS_PENDING};
use crate::models::driver::{Driver, NewDriver};
use crate::models::location::GeoPoint;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn list_deliveries(&self) -> Result<Vec<Delivery>, AppError>;
    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery, AppError>;
    async fn delete_delivery(&self, id: &str) -> Result<(), AppError>;
    async fn delete_all_deliveries(&self) -> Result<(), AppError>;

    async fn list_drivers(&self) -> Result<Vec<Driver>, AppError>;
    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError>;
    async fn delete_driver(&self, id: &str) -> Result<(), AppError>;
    async fn delete_all_drivers(&self) -> Result<(), AppError>;
}

#[derive(Default)]
pub struct InMemoryRepository {
    deliveries: DashMap<String, Delivery>,
    drivers: DashMap<String, Driver>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn list_deliveries(&self) -> Result<Vec<Delivery>, AppError> {
        let mut deliveries: Vec<Delivery> = self
            .deliveries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        deliveries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(deliveries)
    }

    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery, AppError> {
        let delivery = delivery.into_delivery(Uuid::new_v4().to_string());
        self.deliveries.insert(delivery.id.clone(), delivery.clone());
        Ok(delivery)
    }

    async fn delete_delivery(&self, id: &str) -> Result<(), AppError> {
        self.deliveries
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("delivery {id} not found")))
    }

    async fn delete_all_deliveries(&self) -> Result<(), AppError> {
        self.deliveries.clear();
        Ok(())
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, AppError> {
        let mut drivers: Vec<Driver> = self
            .drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        drivers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(drivers)
    }

    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError> {
        let email_taken = self
            .drivers
            .iter()
            .any(|entry| entry.value().email.eq_ignore_ascii_case(&driver.email));
        if email_taken {
            return Err(AppError::Conflict(format!(
                "driver with email {} already exists",
                driver.email
            )));
        }

        let driver = driver.into_driver(format!("drv-{}", Uuid::new_v4()));
        self.drivers.insert(driver.id.clone(), driver.clone());
        Ok(driver)
    }

    async fn delete_driver(&self, id: &str) -> Result<(), AppError> {
        self.drivers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("driver {id} not found")))
    }

    async fn delete_all_drivers(&self) -> Result<(), AppError> {
        self.drivers.clear();
        Ok(())
    }
}

/// Row shape of the REST persistence API: coordinates are flat columns and
/// may arrive as decimal strings.
#[derive(Debug, Deserialize)]
struct DeliveryRow {
    id: String,
    name: String,
    address: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    lng: f64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    eta: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    duration: Option<u32>,
}

impl From<DeliveryRow> for Delivery {
    fn from(row: DeliveryRow) -> Self {
        Delivery {
            id: row.id,
            name: row.name,
            address: row.address,
            email: row.email.unwrap_or_default(),
            location: GeoPoint {
                lat: row.lat,
                lng: row.lng,
            },
            status: row.status.unwrap_or_else(|| STATUS_PENDING.to_string()),
            eta: row.eta.unwrap_or_else(|| ETA_UNSET.to_string()),
            photo_url: row.photo_url,
            notes: row.notes,
            duration: row.duration,
        }
    }
}

#[derive(Debug, Serialize)]
struct DeliveryInsert<'a> {
    name: &'a str,
    address: &'a str,
    email: &'a str,
    lat: f64,
    lng: f64,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DriverRow {
    id: String,
    name: String,
    email: String,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    cognito_sub: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DriverRow> for Driver {
    fn from(row: DriverRow) -> Self {
        Driver {
            id: row.id,
            name: row.name,
            email: row.email,
            phone_number: row.phone_number,
            identity_sub: row.cognito_sub,
            start_location: None,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DriverInsert<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cognito_sub: Option<&'a str>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrText {
        Number(f64),
        Text(String),
    }

    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(value) => Ok(value),
        NumberOrText::Text(raw) => raw.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// Persistence over the dispatcher backend's `/api/deliveries` and
/// `/api/drivers` resources.
pub struct RestRepository {
    http: reqwest::Client,
    base_url: String,
}

impl RestRepository {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }
}

async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response.text().await.unwrap_or_default();
    debug!(status = %status, detail = %detail, what, "persistence request failed");
    Err(match status.as_u16() {
        404 => AppError::NotFound(format!("{what} not found")),
        409 => AppError::Conflict(format!("{what} conflicts with an existing record")),
        400 => AppError::Validation(format!("{what} rejected by persistence: {detail}")),
        _ => AppError::ExternalService(format!("persistence returned {status} for {what}")),
    })
}

#[async_trait]
impl Repository for RestRepository {
    async fn list_deliveries(&self) -> Result<Vec<Delivery>, AppError> {
        let response = self.http.get(self.url("deliveries")).send().await?;
        let rows: Vec<DeliveryRow> = check(response, "deliveries").await?.json().await?;
        Ok(rows.into_iter().map(Delivery::from).collect())
    }

    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery, AppError> {
        let insert = DeliveryInsert {
            name: &delivery.name,
            address: &delivery.address,
            email: &delivery.email,
            lat: delivery.location.lat,
            lng: delivery.location.lng,
            status: STATUS_PENDING,
            photo_url: delivery.photo_url.as_deref(),
            notes: delivery.notes.as_deref(),
        };
        let response = self
            .http
            .post(self.url("deliveries"))
            .json(&insert)
            .send()
            .await?;
        let row: DeliveryRow = check(response, "delivery").await?.json().await?;

        let mut created = Delivery::from(row);
        if created.duration.is_none() {
            created.duration = delivery.duration;
        }
        Ok(created)
    }

    async fn delete_delivery(&self, id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.url(&format!("deliveries/{id}")))
            .send()
            .await?;
        check(response, "delivery").await.map(|_| ())
    }

    async fn delete_all_deliveries(&self) -> Result<(), AppError> {
        let response = self.http.delete(self.url("deliveries")).send().await?;
        check(response, "deliveries").await.map(|_| ())
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, AppError> {
        let response = self.http.get(self.url("drivers")).send().await?;
        let rows: Vec<DriverRow> = check(response, "drivers").await?.json().await?;
        Ok(rows.into_iter().map(Driver::from).collect())
    }

    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError> {
        let insert = DriverInsert {
            name: &driver.name,
            email: &driver.email,
            phone_number: driver.phone_number.as_deref(),
            cognito_sub: driver.identity_sub.as_deref(),
        };
        let response = self
            .http
            .post(self.url("drivers"))
            .json(&insert)
            .send()
            .await?;
        let row: DriverRow = check(response, "driver").await?.json().await?;

        let mut created = Driver::from(row);
        created.start_location = driver.start_location;
        Ok(created)
    }

    async fn delete_driver(&self, id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.url(&format!("drivers/{id}")))
            .send()
            .await?;
        check(response, "driver").await.map(|_| ())
    }

    async fn delete_all_drivers(&self) -> Result<(), AppError> {
        let response = self.http.delete(self.url("drivers")).send().await?;
        check(response, "drivers").await.map(|_| ())
    }
}
