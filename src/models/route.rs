use serde::{Deserialize, Serialize};

use crate::models::delivery::Delivery;
use crate::models::driver::Driver;

pub const UNASSIGNED_ROUTE_ID: &str = "unassigned-deliveries-route";
pub const UNASSIGNED_ROUTE_NAME: &str = "Unassigned Deliveries";
pub const DRIVER_ROUTE_PREFIX: &str = "route-for-driver-";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteColor {
    pub color: String,
    pub color_dimmed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: String,
    pub driver_id: Option<String>,
    pub driver_name: String,
    pub color: String,
    pub color_dimmed: String,
    pub deliveries: Vec<Delivery>,
}

impl Route {
    pub fn unassigned() -> Self {
        Self {
            id: UNASSIGNED_ROUTE_ID.to_string(),
            driver_id: None,
            driver_name: UNASSIGNED_ROUTE_NAME.to_string(),
            color: "#808080".to_string(),
            color_dimmed: "#C0C0C0".to_string(),
            deliveries: Vec::new(),
        }
    }

    pub fn for_driver(driver: &Driver, color: RouteColor) -> Self {
        Self {
            id: route_id_for_driver(&driver.id),
            driver_id: Some(driver.id.clone()),
            driver_name: driver.name.clone(),
            color: color.color,
            color_dimmed: color.color_dimmed,
            deliveries: Vec::new(),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.driver_id.is_none()
    }

    pub fn position_of(&self, delivery_id: &str) -> Option<usize> {
        self.deliveries.iter().position(|d| d.id == delivery_id)
    }
}

pub fn route_id_for_driver(driver_id: &str) -> String {
    format!("{DRIVER_ROUTE_PREFIX}{driver_id}")
}

/// Display aggregates derived from a route's current assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSummary {
    pub total_stops: usize,
    pub duration_minutes: i64,
    pub total_duration: String,
    pub distance_km: Option<f64>,
    pub total_distance: Option<String>,
    pub source: SummarySource,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Estimate,
    Optimizer,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RouteView {
    #[serde(flatten)]
    pub route: Route,
    #[serde(flatten)]
    pub summary: RouteSummary,
}
