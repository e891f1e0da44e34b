use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ShiftWindow;
use crate::error::AppError;
use crate::models::location::NamedLocation;
use crate::models::optimization::{
    OptimizationRequest, RequestOptions, SolverLocation, VehicleSpec, VisitSpec,
};
use crate::store::RouteStore;

pub const DEFAULT_SERVICE_MINUTES: u32 = 5;

/// Which solver endpoint a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointVariant {
    /// Solution returned in the response body.
    Immediate,
    /// Response carries a job id that must be polled.
    LongRunning,
}

impl EndpointVariant {
    pub fn for_visit_count(visits: usize, threshold: usize) -> Self {
        if visits > threshold {
            EndpointVariant::LongRunning
        } else {
            EndpointVariant::Immediate
        }
    }
}

pub fn build_request(store: &RouteStore, shift: &ShiftWindow) -> Result<OptimizationRequest, AppError> {
    if store.delivery_count() == 0 {
        return Err(AppError::Precondition("no deliveries to route".to_string()));
    }
    if store.drivers().is_empty() {
        return Err(AppError::Precondition(
            "no drivers available to assign routes".to_string(),
        ));
    }

    let visits: BTreeMap<String, VisitSpec> = store
        .all_deliveries()
        .map(|delivery| {
            let visit = VisitSpec {
                location: SolverLocation {
                    name: Some(delivery.address.clone()),
                    lat: delivery.location.lat,
                    lng: delivery.location.lng,
                },
                duration: delivery
                    .duration
                    .filter(|minutes| *minutes > 0)
                    .unwrap_or(DEFAULT_SERVICE_MINUTES),
            };
            (delivery.id.clone(), visit)
        })
        .collect();

    let fleet: BTreeMap<String, VehicleSpec> = store
        .drivers()
        .iter()
        .map(|driver| {
            let start = driver.start_location.as_ref().unwrap_or(store.depot());
            let vehicle = VehicleSpec {
                start_location: solver_location(start),
                shift_start: shift.start.clone(),
                shift_end: shift.end.clone(),
            };
            (driver.id.clone(), vehicle)
        })
        .collect();

    Ok(OptimizationRequest {
        visits,
        fleet,
        options: RequestOptions::default(),
    })
}

fn solver_location(location: &NamedLocation) -> SolverLocation {
    SolverLocation {
        name: Some(location.name.clone()),
        lat: location.lat,
        lng: location.lng,
    }
}
