use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::delivery::{Delivery, STATUS_SCHEDULED};
use crate::models::optimization::{SolveResponse, Solution};
use crate::store::RouteStore;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ApplyOutcome {
    pub assigned: usize,
    pub unassigned: usize,
    pub dropped_stops: usize,
}

/// Rejects solver payloads that report an error or carry no solution.
pub fn validate_response(response: SolveResponse) -> Result<Solution, AppError> {
    if response.status.as_deref() == Some("error") {
        return Err(AppError::ExternalService(
            "optimizer reported an error status".to_string(),
        ));
    }

    let routes = response.solution.ok_or_else(|| {
        AppError::ExternalService("optimizer response did not contain a solution".to_string())
    })?;

    Ok(Solution {
        routes,
        total_travel_time: response.total_travel_time,
        total_working_time: response.total_working_time,
    })
}

/// Replaces the store's route assignment with the solver's grouping and
/// order. Anything the solver did not place lands in the unassigned pool.
pub fn apply_solution(store: &mut RouteStore, solution: Solution) -> ApplyOutcome {
    let current: Vec<Delivery> = store.all_deliveries().cloned().collect();
    let by_id: HashMap<&str, &Delivery> = current.iter().map(|d| (d.id.as_str(), d)).collect();

    let known_drivers: HashSet<&str> = store.drivers().iter().map(|d| d.id.as_str()).collect();
    for vehicle_id in solution.routes.keys() {
        if !known_drivers.contains(vehicle_id.as_str()) {
            warn!(vehicle_id = %vehicle_id, "solution references unknown driver; its stops stay unassigned");
        }
    }

    let mut placed: HashSet<&str> = HashSet::new();
    let mut by_driver: HashMap<String, Vec<Delivery>> = HashMap::new();
    let mut dropped_stops = 0;

    for driver in store.drivers() {
        let Some(stops) = solution.stops_for(&driver.id) else {
            continue;
        };

        let mut sequence = Vec::with_capacity(stops.len());
        for stop in stops.iter().filter(|s| !s.is_start_placeholder()) {
            let Some(original) = by_id.get(stop.location_id.as_str()) else {
                warn!(delivery_id = %stop.location_id, "solution references unknown delivery; dropping stop");
                dropped_stops += 1;
                continue;
            };
            if !placed.insert(original.id.as_str()) {
                warn!(delivery_id = %stop.location_id, "delivery placed twice in solution; keeping first placement");
                dropped_stops += 1;
                continue;
            }

            let mut scheduled = (*original).clone();
            scheduled.eta = stop.arrival_time.clone();
            scheduled.status = STATUS_SCHEDULED.to_string();
            sequence.push(scheduled);
        }
        by_driver.insert(driver.id.clone(), sequence);
    }

    let unassigned: Vec<Delivery> = current
        .iter()
        .filter(|d| !placed.contains(d.id.as_str()))
        .cloned()
        .collect();

    let outcome = ApplyOutcome {
        assigned: placed.len(),
        unassigned: unassigned.len(),
        dropped_stops,
    };

    store.install_assignment(by_driver, unassigned, solution);

    if let Err(violation) = store.check_partition() {
        warn!(violation = %violation, "partition check failed after applying solution");
    }

    info!(
        assigned = outcome.assigned,
        unassigned = outcome.unassigned,
        dropped_stops = outcome.dropped_stops,
        "optimizer solution applied"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::{apply_solution, validate_response};
    use crate::error::AppError;
    use crate::models::delivery::Delivery;
    use crate::models::driver::{Driver, NewDriver};
    use crate::models::location::{GeoPoint, NamedLocation};
    use crate::models::optimization::{SolveResponse, Solution, Stop};
    use crate::store::RouteStore;

    fn delivery(id: &str) -> Delivery {
        Delivery {
            id: id.to_string(),
            name: id.to_string(),
            address: format!("{id} Robson St"),
            email: "c@test.com".to_string(),
            location: GeoPoint {
                lat: 49.28,
                lng: -123.12,
            },
            status: "Pending".to_string(),
            eta: "N/A".to_string(),
            photo_url: None,
            notes: None,
            duration: Some(10),
        }
    }

    fn stop(id: &str, arrival: &str) -> Stop {
        Stop {
            location_id: id.to_string(),
            location_name: None,
            arrival_time: arrival.to_string(),
            finish_time: None,
        }
    }

    fn store_with(drivers: &[&str], deliveries: &[&str]) -> (RouteStore, Vec<Driver>) {
        let mut store = RouteStore::new(NamedLocation {
            name: "Depot".to_string(),
            lat: 49.2827,
            lng: -123.1207,
        });
        let created = drivers
            .iter()
            .map(|name| {
                store
                    .add_driver(NewDriver {
                        name: name.to_string(),
                        email: format!("{name}@example.com"),
                        phone_number: None,
                        identity_sub: None,
                        start_location: None,
                    })
                    .unwrap()
            })
            .collect();
        store.add_deliveries(deliveries.iter().map(|id| delivery(id)).collect(), None);
        (store, created)
    }

    fn solution(entries: Vec<(&str, Vec<Stop>)>) -> Solution {
        Solution {
            routes: entries
                .into_iter()
                .map(|(id, stops)| (id.to_string(), stops))
                .collect::<HashMap<_, _>>(),
            ..Solution::default()
        }
    }

    fn route_ids(store: &RouteStore, route_id: &str) -> Vec<String> {
        store
            .route(route_id)
            .unwrap()
            .deliveries
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    #[test]
    fn placed_subset_goes_to_drivers_and_complement_to_unassigned() {
        let (mut store, drivers) = store_with(&["ann", "bob"], &["d1", "d2", "d3", "d4", "d5"]);
        let ann = &drivers[0].id;
        let bob = &drivers[1].id;

        let outcome = apply_solution(
            &mut store,
            solution(vec![
                (
                    ann.as_str(),
                    vec![stop(&format!("{ann}_start"), "08:00"), stop("d3", "08:20"), stop("d1", "08:45")],
                ),
                (bob.as_str(), vec![stop("d5", "09:10")]),
            ]),
        );

        assert_eq!(outcome.assigned, 3);
        assert_eq!(outcome.unassigned, 2);
        assert_eq!(route_ids(&store, &format!("route-for-driver-{ann}")), vec!["d3", "d1"]);
        assert_eq!(route_ids(&store, &format!("route-for-driver-{bob}")), vec!["d5"]);

        let pool: HashSet<String> = store.unassigned().deliveries.iter().map(|d| d.id.clone()).collect();
        assert_eq!(pool, HashSet::from(["d2".to_string(), "d4".to_string()]));
        assert!(store.check_partition().is_ok());
        assert!(store.routes_generated());
    }

    #[test]
    fn placed_deliveries_are_stamped_scheduled_with_eta() {
        let (mut store, drivers) = store_with(&["ann"], &["d1"]);
        let ann = drivers[0].id.clone();

        apply_solution(&mut store, solution(vec![(ann.as_str(), vec![stop("d1", "10:05")])]));

        let (_, placed) = store.find_delivery("d1").unwrap();
        assert_eq!(placed.status, "Scheduled");
        assert_eq!(placed.eta, "10:05");
    }

    #[test]
    fn unknown_and_duplicate_stops_are_dropped() {
        let (mut store, drivers) = store_with(&["ann", "bob"], &["d1", "d2"]);
        let ann = drivers[0].id.clone();
        let bob = drivers[1].id.clone();

        let outcome = apply_solution(
            &mut store,
            solution(vec![
                (ann.as_str(), vec![stop("ghost", "08:10"), stop("d1", "08:20")]),
                (bob.as_str(), vec![stop("d1", "08:30")]),
                ("stranger", vec![stop("d2", "08:40")]),
            ]),
        );

        assert_eq!(outcome.dropped_stops, 2);
        assert_eq!(store.delivery_count(), 2);
        assert_eq!(route_ids(&store, &format!("route-for-driver-{ann}")), vec!["d1"]);
        assert_eq!(route_ids(&store, &format!("route-for-driver-{bob}")), Vec::<String>::new());
        assert_eq!(store.unassigned().deliveries[0].id, "d2");
        assert!(store.check_partition().is_ok());
    }

    #[test]
    fn reoptimizing_keeps_route_colors() {
        let (mut store, drivers) = store_with(&["ann", "bob"], &["d1", "d2"]);
        let colors_before: Vec<String> = store.routes().iter().map(|r| r.color.clone()).collect();
        let ann = drivers[0].id.clone();
        let bob = drivers[1].id.clone();

        apply_solution(&mut store, solution(vec![(ann.as_str(), vec![stop("d1", "08:00")])]));
        let colors_first: Vec<String> = store.routes().iter().map(|r| r.color.clone()).collect();
        apply_solution(
            &mut store,
            solution(vec![(bob.as_str(), vec![stop("d1", "08:00"), stop("d2", "08:30")])]),
        );
        let colors_second: Vec<String> = store.routes().iter().map(|r| r.color.clone()).collect();

        assert_eq!(colors_before, colors_first);
        assert_eq!(colors_first, colors_second);
        assert_eq!(route_ids(&store, &format!("route-for-driver-{ann}")), Vec::<String>::new());
    }

    #[test]
    fn error_status_and_missing_solution_are_rejected() {
        let errored = SolveResponse {
            status: Some("error".to_string()),
            solution: Some(HashMap::new()),
            ..SolveResponse::default()
        };
        let empty = SolveResponse {
            status: Some("success".to_string()),
            ..SolveResponse::default()
        };

        assert!(matches!(validate_response(errored), Err(AppError::ExternalService(_))));
        assert!(matches!(validate_response(empty), Err(AppError::ExternalService(_))));
    }
}
