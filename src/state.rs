use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::config::{Config, ShiftWindow};
use crate::engine::optimize::OptimizationRun;
use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::observability::metrics::Metrics;
use crate::services::email::EmailSender;
use crate::services::geocoding::Geocoder;
use crate::services::persistence::Repository;
use crate::services::vrp::VrpClient;
use crate::store::RouteStore;

/// External collaborators the planner talks to.
#[derive(Clone)]
pub struct Services {
    pub repository: Arc<dyn Repository>,
    pub geocoder: Arc<dyn Geocoder>,
    pub vrp: Arc<dyn VrpClient>,
    pub email: Arc<dyn EmailSender>,
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub shift: ShiftWindow,
    pub long_running_threshold: usize,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub geocode_interval: Duration,
    /// Deadline for a single repository call made while the store is locked.
    pub persistence_timeout: Duration,
    /// Finished runs kept in the registry for `GET /optimize/{id}`.
    pub retained_runs: usize,
}

impl PlannerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            shift: config.shift.clone(),
            long_running_threshold: config.vrp.long_running_threshold,
            poll_interval: config.vrp.poll_interval,
            max_poll_attempts: config.vrp.max_poll_attempts,
            geocode_interval: config.geocoder.interval,
            persistence_timeout: config.http_timeout,
            retained_runs: config.vrp.retained_runs,
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            shift: ShiftWindow::default(),
            long_running_threshold: 60,
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 150,
            geocode_interval: Duration::from_millis(200),
            persistence_timeout: Duration::from_secs(10),
            retained_runs: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Bootstrapped,
    DriverAdded,
    DriverDeleted,
    DriversCleared,
    DeliveryAdded,
    DeliveryDeleted,
    DeliveriesCleared,
    DeliveriesImported,
    Reordered,
    RoutesOptimized,
    DepotChanged,
    SelectionChanged,
}

/// Broadcast after every store change so views can refetch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoreEvent {
    pub kind: ChangeKind,
    pub revision: u64,
}

pub struct ActiveRun {
    pub id: Uuid,
    pub cancel: CancellationToken,
}

pub struct AppState {
    pub store: Mutex<RouteStore>,
    pub services: Services,
    pub settings: PlannerSettings,
    pub runs: DashMap<Uuid, OptimizationRun>,
    pub active_run: Mutex<Option<ActiveRun>>,
    pub events_tx: broadcast::Sender<StoreEvent>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        services: Services,
        settings: PlannerSettings,
        depot: NamedLocation,
        event_buffer_size: usize,
    ) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            store: Mutex::new(RouteStore::new(depot)),
            services,
            settings,
            runs: DashMap::new(),
            active_run: Mutex::new(None),
            events_tx,
            metrics: Metrics::new(),
        }
    }

    /// Loads drivers and deliveries from persistence into a fresh session.
    pub async fn bootstrap(&self) -> Result<(), AppError> {
        let drivers = self.services.repository.list_drivers().await?;
        let deliveries = self.services.repository.list_deliveries().await?;

        let mut store = self.store.lock().await;
        store.bootstrap(drivers, deliveries);
        self.publish(&store, ChangeKind::Bootstrapped);
        Ok(())
    }

    /// Records store gauges and notifies subscribers of a change.
    pub fn publish(&self, store: &RouteStore, kind: ChangeKind) {
        let unassigned = store.unassigned().deliveries.len();
        let assigned = store.delivery_count() - unassigned;
        self.metrics
            .record_store_size(assigned, unassigned, store.drivers().len());

        if let Err(violation) = store.check_partition() {
            warn!(violation = %violation, ?kind, "route partition violated");
        }

        let _ = self.events_tx.send(StoreEvent {
            kind,
            revision: store.revision(),
        });
    }

    /// Stops any in-flight optimization; used on shutdown.
    pub async fn cancel_active_run(&self) {
        if let Some(active) = self.active_run.lock().await.as_ref() {
            active.cancel.cancel();
        }
    }
}
