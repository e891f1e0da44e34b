//! Store commands that must also reach the persistence service.
//!
//! Each command snapshots the store, applies the change locally, then
//! persists it. A persistence failure, or a call that outlives the
//! persistence deadline, restores the snapshot, so the store never reflects
//! a write the backend refused.

use std::future::Future;

use serde::Deserialize;
use tokio::sync::MutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::{Delivery, NewDelivery};
use crate::models::driver::{Driver, NewDriver};
use crate::models::location::{GeoPoint, NamedLocation};
use crate::services::geocoding::Geocoder;
use crate::state::{AppState, ChangeKind};
use crate::store::{DragCommand, RouteStore, StoreSnapshot};

/// Raw delivery fields as typed by a dispatcher or read from a CSV row.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct DeliveryInput {
    pub name: String,
    pub address: String,
    pub email: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub duration: Option<u32>,
    /// Route to append to; the unassigned pool when absent or unknown.
    #[serde(default)]
    pub route_id: Option<String>,
}

impl DeliveryInput {
    pub fn validate(&self) -> Result<(), AppError> {
        let missing: Vec<&str> = [
            ("name", &self.name),
            ("address", &self.address),
            ("email", &self.email),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Both coordinates, when both are present and finite.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        let point = GeoPoint {
            lat: self.lat?,
            lng: self.lng?,
        };
        point.is_finite().then_some(point)
    }

    /// Uses the supplied coordinates, else geocodes the address.
    pub async fn resolve_location(&self, geocoder: &dyn Geocoder) -> Result<GeoPoint, AppError> {
        if let Some(point) = self.coordinates() {
            return Ok(point);
        }

        let address = self.address.trim();
        geocoder.geocode(address).await?.ok_or_else(|| {
            AppError::ExternalService(format!("no coordinates found for address: {address}"))
        })
    }

    pub fn into_new_delivery(self, location: GeoPoint) -> NewDelivery {
        NewDelivery {
            name: self.name.trim().to_string(),
            address: self.address.trim().to_string(),
            email: self.email.trim().to_string(),
            location,
            photo_url: self.photo_url.filter(|url| !url.trim().is_empty()),
            notes: self.notes.filter(|notes| !notes.trim().is_empty()),
            duration: self.duration,
        }
    }
}

/// Awaits a repository call, giving up after the configured deadline.
pub(crate) async fn persist<T>(
    state: &AppState,
    command: &str,
    call: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::time::timeout(state.settings.persistence_timeout, call)
        .await
        .map_err(|_| {
            AppError::ExternalService(format!(
                "persistence did not answer {command} within {:?}",
                state.settings.persistence_timeout
            ))
        })?
}

fn rollback(
    store: &mut MutexGuard<'_, RouteStore>,
    snapshot: StoreSnapshot,
    err: AppError,
    command: &str,
) -> AppError {
    store.restore(snapshot);
    warn!(command, error = %err, "persistence failed; store rolled back");
    err
}

pub async fn add_driver(state: &AppState, new_driver: NewDriver) -> Result<Driver, AppError> {
    let mut store = state.store.lock().await;
    let snapshot = store.snapshot();

    let provisional = store.add_driver(new_driver)?;
    let to_persist = NewDriver {
        name: provisional.name.clone(),
        email: provisional.email.clone(),
        phone_number: provisional.phone_number.clone(),
        identity_sub: provisional.identity_sub.clone(),
        start_location: provisional.start_location.clone(),
    };

    let call = state.services.repository.create_driver(to_persist);
    let persisted = match persist(state, "add_driver", call).await {
        Ok(persisted) => persisted,
        Err(err) => return Err(rollback(&mut store, snapshot, err, "add_driver")),
    };

    let driver_id = persisted.id.clone();
    if !store.replace_driver(&provisional.id, persisted) {
        store.restore(snapshot);
        return Err(AppError::Internal(format!(
            "could not reconcile persisted driver {driver_id}"
        )));
    }

    let driver = store
        .driver(&driver_id)
        .cloned()
        .ok_or_else(|| AppError::Internal(format!("driver {driver_id} missing after insert")))?;
    state.publish(&store, ChangeKind::DriverAdded);

    info!(driver_id = %driver.id, "driver added");
    Ok(driver)
}

pub async fn delete_driver(state: &AppState, driver_id: &str) -> Result<(), AppError> {
    let mut store = state.store.lock().await;
    if store.driver(driver_id).is_none() {
        return Err(AppError::NotFound(format!("driver {driver_id} not found")));
    }

    let snapshot = store.snapshot();
    store.delete_driver(driver_id);

    let call = state.services.repository.delete_driver(driver_id);
    if let Err(err) = persist(state, "delete_driver", call).await {
        return Err(rollback(&mut store, snapshot, err, "delete_driver"));
    }

    state.publish(&store, ChangeKind::DriverDeleted);
    info!(driver_id = %driver_id, "driver deleted");
    Ok(())
}

pub async fn delete_all_drivers(state: &AppState) -> Result<usize, AppError> {
    let mut store = state.store.lock().await;
    let snapshot = store.snapshot();
    let removed = store.delete_all_drivers();

    let call = state.services.repository.delete_all_drivers();
    if let Err(err) = persist(state, "delete_all_drivers", call).await {
        return Err(rollback(&mut store, snapshot, err, "delete_all_drivers"));
    }

    state.publish(&store, ChangeKind::DriversCleared);
    info!(removed, "all drivers deleted");
    Ok(removed)
}

pub async fn create_delivery(state: &AppState, input: DeliveryInput) -> Result<Delivery, AppError> {
    input.validate()?;
    let location = input
        .resolve_location(state.services.geocoder.as_ref())
        .await?;
    let target_route = input.route_id.clone();
    let new_delivery = input.into_new_delivery(location);

    let mut store = state.store.lock().await;
    let snapshot = store.snapshot();

    let provisional_id = format!("pending-{}", Uuid::new_v4());
    let provisional = new_delivery.clone().into_delivery(provisional_id.clone());
    store.add_deliveries(vec![provisional], target_route.as_deref());

    let call = state.services.repository.create_delivery(new_delivery);
    let persisted = match persist(state, "create_delivery", call).await {
        Ok(persisted) => persisted,
        Err(err) => return Err(rollback(&mut store, snapshot, err, "create_delivery")),
    };

    if !store.replace_delivery(&provisional_id, persisted.clone()) {
        store.restore(snapshot);
        return Err(AppError::Internal(format!(
            "could not reconcile persisted delivery {}",
            persisted.id
        )));
    }

    state.publish(&store, ChangeKind::DeliveryAdded);
    info!(delivery_id = %persisted.id, "delivery created");
    Ok(persisted)
}

pub async fn delete_delivery(state: &AppState, delivery_id: &str) -> Result<Delivery, AppError> {
    let mut store = state.store.lock().await;
    let snapshot = store.snapshot();

    let Some(removed) = store.delete_delivery(delivery_id) else {
        return Err(AppError::NotFound(format!("delivery {delivery_id} not found")));
    };

    let call = state.services.repository.delete_delivery(delivery_id);
    if let Err(err) = persist(state, "delete_delivery", call).await {
        return Err(rollback(&mut store, snapshot, err, "delete_delivery"));
    }

    state.publish(&store, ChangeKind::DeliveryDeleted);
    info!(delivery_id = %delivery_id, "delivery deleted");
    Ok(removed)
}

pub async fn delete_all_deliveries(state: &AppState) -> Result<usize, AppError> {
    let mut store = state.store.lock().await;
    let snapshot = store.snapshot();
    let removed = store.delete_all_deliveries();

    let call = state.services.repository.delete_all_deliveries();
    if let Err(err) = persist(state, "delete_all_deliveries", call).await {
        return Err(rollback(&mut store, snapshot, err, "delete_all_deliveries"));
    }

    state.publish(&store, ChangeKind::DeliveriesCleared);
    info!(removed, "all deliveries deleted");
    Ok(removed)
}

/// Local-only reorder; returns whether the drag changed anything.
pub async fn reorder(state: &AppState, drag: &DragCommand) -> bool {
    let mut store = state.store.lock().await;
    let applied = store.apply_drag(drag);
    if applied {
        state.publish(&store, ChangeKind::Reordered);
    }
    applied
}

pub async fn set_depot(state: &AppState, depot: NamedLocation) -> Result<NamedLocation, AppError> {
    if depot.name.trim().is_empty() {
        return Err(AppError::Validation("depot name cannot be empty".to_string()));
    }
    if !depot.point().is_finite() {
        return Err(AppError::Validation(
            "depot coordinates must be finite numbers".to_string(),
        ));
    }

    let mut store = state.store.lock().await;
    store.set_depot(depot.clone());
    state.publish(&store, ChangeKind::DepotChanged);
    Ok(depot)
}
