//! Authoritative in-memory model of drivers, deliveries and route assignments.
//!
//! Every delivery sits in exactly one route, and exactly one route (the
//! unassigned pool) has no driver. All command methods either apply fully or
//! leave the store untouched; unknown ids are absorbed as logged no-ops.

pub mod color;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::delivery::Delivery;
use crate::models::driver::{Driver, NewDriver};
use crate::models::location::NamedLocation;
use crate::models::optimization::Solution;
use crate::models::route::{route_id_for_driver, Route, UNASSIGNED_ROUTE_ID};
use crate::store::color::ColorAllocator;

/// A drag-and-drop gesture, independent of any UI library's event shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DragCommand {
    pub source_route_id: String,
    pub source_index: usize,
    pub dest_route_id: String,
    pub dest_index: usize,
    pub delivery_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Selection {
    pub route_id: Option<String>,
    pub delivery_id: Option<String>,
}

/// Full copy of the store taken before an optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot(RouteStore);

#[derive(Debug, Clone, PartialEq)]
pub struct RouteStore {
    routes: Vec<Route>,
    drivers: Vec<Driver>,
    depot: NamedLocation,
    colors: ColorAllocator,
    solution: Option<Solution>,
    routes_generated: bool,
    selection: Selection,
    revision: u64,
}

impl RouteStore {
    pub fn new(depot: NamedLocation) -> Self {
        Self {
            routes: vec![Route::unassigned()],
            drivers: Vec::new(),
            depot,
            colors: ColorAllocator::default(),
            solution: None,
            routes_generated: false,
            selection: Selection::default(),
            revision: 0,
        }
    }

    /// Replaces the whole session with persisted data: one empty route per
    /// driver and every delivery in the unassigned pool.
    pub fn bootstrap(&mut self, drivers: Vec<Driver>, deliveries: Vec<Delivery>) {
        let mut unassigned = Route::unassigned();
        unassigned.deliveries = dedupe_by_id(deliveries);
        sort_by_name(&mut unassigned.deliveries);

        let mut routes = vec![unassigned];
        let mut kept_drivers: Vec<Driver> = Vec::with_capacity(drivers.len());
        for driver in drivers {
            if kept_drivers.iter().any(|d| d.id == driver.id) {
                warn!(driver_id = %driver.id, "duplicate driver id during bootstrap; skipping");
                continue;
            }
            routes.push(Route::for_driver(&driver, self.colors.next_color()));
            kept_drivers.push(driver);
        }

        self.routes = routes;
        self.drivers = kept_drivers;
        self.mark_mutated();
    }

    pub fn add_driver(&mut self, new_driver: NewDriver) -> Result<Driver, AppError> {
        validate_driver(&new_driver)?;

        let mut new_driver = new_driver;
        new_driver.name = new_driver.name.trim().to_string();
        new_driver.email = new_driver.email.trim().to_string();
        if new_driver.start_location.is_none() {
            new_driver.start_location = Some(self.depot.clone());
        }

        let driver = new_driver.into_driver(Uuid::new_v4().to_string());
        self.routes
            .push(Route::for_driver(&driver, self.colors.next_color()));
        self.drivers.push(driver.clone());
        self.mark_mutated();

        debug!(driver_id = %driver.id, "driver added");
        Ok(driver)
    }

    /// Swaps an optimistically inserted driver for the persisted record,
    /// re-keying its route while keeping color and deliveries.
    pub fn replace_driver(&mut self, provisional_id: &str, persisted: Driver) -> bool {
        if provisional_id != persisted.id && self.driver(&persisted.id).is_some() {
            warn!(driver_id = %persisted.id, "persisted driver id already present; not replacing");
            return false;
        }

        let Some(driver_index) = self.drivers.iter().position(|d| d.id == provisional_id) else {
            warn!(driver_id = %provisional_id, "cannot reconcile unknown driver");
            return false;
        };

        if let Some(route) = self
            .routes
            .iter_mut()
            .find(|r| r.driver_id.as_deref() == Some(provisional_id))
        {
            route.id = route_id_for_driver(&persisted.id);
            route.driver_id = Some(persisted.id.clone());
            route.driver_name = persisted.name.clone();
        }

        let mut persisted = persisted;
        if persisted.start_location.is_none() {
            persisted.start_location = self.drivers[driver_index].start_location.clone();
        }
        self.drivers[driver_index] = persisted;
        self.mark_mutated();
        true
    }

    /// Swaps an optimistically inserted delivery for the persisted record in
    /// place, keeping its route and position.
    pub fn replace_delivery(&mut self, provisional_id: &str, persisted: Delivery) -> bool {
        if provisional_id != persisted.id && self.find_delivery(&persisted.id).is_some() {
            warn!(delivery_id = %persisted.id, "persisted delivery id already present; not replacing");
            return false;
        }

        let located = self
            .routes
            .iter()
            .enumerate()
            .find_map(|(ri, route)| route.position_of(provisional_id).map(|di| (ri, di)));
        let Some((route_index, delivery_index)) = located else {
            warn!(delivery_id = %provisional_id, "cannot reconcile unknown delivery");
            return false;
        };

        self.routes[route_index].deliveries[delivery_index] = persisted;
        self.mark_mutated();
        true
    }

    pub fn delete_driver(&mut self, driver_id: &str) -> bool {
        let Some(route_index) = self
            .routes
            .iter()
            .position(|r| r.driver_id.as_deref() == Some(driver_id))
        else {
            warn!(driver_id = %driver_id, "delete requested for unknown driver");
            return false;
        };

        let removed = self.routes.remove(route_index);
        self.drivers.retain(|d| d.id != driver_id);
        self.unassigned_mut().deliveries.extend(removed.deliveries);
        self.mark_mutated();
        true
    }

    pub fn delete_delivery(&mut self, delivery_id: &str) -> Option<Delivery> {
        let located = self
            .routes
            .iter()
            .enumerate()
            .find_map(|(ri, route)| route.position_of(delivery_id).map(|di| (ri, di)));

        let Some((route_index, delivery_index)) = located else {
            warn!(delivery_id = %delivery_id, "delete requested for unknown delivery");
            return None;
        };

        let removed = self.routes[route_index].deliveries.remove(delivery_index);
        self.mark_mutated();
        Some(removed)
    }

    pub fn delete_all_deliveries(&mut self) -> usize {
        let removed: usize = self.routes.iter().map(|r| r.deliveries.len()).sum();
        for route in &mut self.routes {
            route.deliveries.clear();
        }
        self.mark_mutated();
        removed
    }

    pub fn delete_all_drivers(&mut self) -> usize {
        let removed = self.drivers.len();
        let mut reassigned = Vec::new();
        self.routes.retain_mut(|route| {
            if route.is_unassigned() {
                true
            } else {
                reassigned.append(&mut route.deliveries);
                false
            }
        });
        self.drivers.clear();
        self.unassigned_mut().deliveries.extend(reassigned);
        self.mark_mutated();
        removed
    }

    /// Appends deliveries to `target_route_id` when it names an existing
    /// route, else to the unassigned pool. Returns the receiving route id.
    pub fn add_deliveries(&mut self, deliveries: Vec<Delivery>, target_route_id: Option<&str>) -> String {
        let mut known: HashSet<String> = self.all_deliveries().map(|d| d.id.clone()).collect();
        let fresh: Vec<Delivery> = deliveries
            .into_iter()
            .filter(|d| {
                let is_new = known.insert(d.id.clone());
                if !is_new {
                    warn!(delivery_id = %d.id, "delivery id already present; skipping");
                }
                is_new
            })
            .collect();

        let route_index = target_route_id
            .and_then(|id| self.routes.iter().position(|r| r.id == id))
            .unwrap_or(0);
        let route_id = self.routes[route_index].id.clone();

        if fresh.is_empty() {
            return route_id;
        }

        let route = &mut self.routes[route_index];
        route.deliveries.extend(fresh);
        sort_by_name(&mut route.deliveries);
        self.mark_mutated();
        route_id
    }

    pub fn reorder_within_route(&mut self, route_id: &str, from_index: usize, to_index: usize) -> bool {
        let Some(route) = self.routes.iter_mut().find(|r| r.id == route_id) else {
            warn!(route_id = %route_id, "reorder requested for unknown route");
            return false;
        };

        let len = route.deliveries.len();
        if from_index >= len || to_index >= len {
            warn!(route_id = %route_id, from_index, to_index, len, "reorder index out of bounds");
            return false;
        }
        if from_index == to_index {
            return false;
        }

        let moved = route.deliveries.remove(from_index);
        route.deliveries.insert(to_index, moved);
        self.mark_mutated();
        true
    }

    /// Applies a drag gesture. Only moves inside one route are honoured.
    pub fn apply_drag(&mut self, drag: &DragCommand) -> bool {
        if drag.source_route_id != drag.dest_route_id {
            debug!(
                source = %drag.source_route_id,
                dest = %drag.dest_route_id,
                "cross-route drag ignored"
            );
            return false;
        }

        let matches_source = self
            .route(&drag.source_route_id)
            .and_then(|r| r.deliveries.get(drag.source_index))
            .is_some_and(|d| d.id == drag.delivery_id);
        if !matches_source {
            warn!(
                route_id = %drag.source_route_id,
                delivery_id = %drag.delivery_id,
                "drag source does not match store; ignoring"
            );
            return false;
        }

        self.reorder_within_route(&drag.source_route_id, drag.source_index, drag.dest_index)
    }

    /// Installs a new driver-to-deliveries assignment produced by the solver.
    /// Route identity and colors carry over by driver id.
    pub(crate) fn install_assignment(
        &mut self,
        mut by_driver: HashMap<String, Vec<Delivery>>,
        unassigned: Vec<Delivery>,
        solution: Solution,
    ) {
        let mut routes = Vec::with_capacity(self.routes.len());
        let mut pool = self.unassigned().clone();
        pool.deliveries = unassigned;
        routes.push(pool);

        for driver in &self.drivers {
            let mut route = match self
                .routes
                .iter()
                .find(|r| r.driver_id.as_deref() == Some(driver.id.as_str()))
            {
                Some(existing) => existing.clone(),
                None => Route::for_driver(driver, self.colors.next_color()),
            };
            route.deliveries = by_driver.remove(&driver.id).unwrap_or_default();
            routes.push(route);
        }

        self.routes = routes;
        self.revision += 1;
        self.prune_selection();
        self.solution = Some(solution);
        self.routes_generated = true;
    }

    pub fn set_depot(&mut self, depot: NamedLocation) {
        self.depot = depot;
        self.revision += 1;
    }

    /// Toggles the selected route: selecting the current one clears it.
    pub fn select_route(&mut self, route_id: &str) -> Option<&str> {
        if self.route(route_id).is_none() {
            warn!(route_id = %route_id, "selection of unknown route ignored");
        } else if self.selection.route_id.as_deref() == Some(route_id) {
            self.selection.route_id = None;
        } else {
            self.selection.route_id = Some(route_id.to_string());
        }
        self.selection.route_id.as_deref()
    }

    pub fn select_delivery(&mut self, delivery_id: &str) -> bool {
        if self.find_delivery(delivery_id).is_none() {
            warn!(delivery_id = %delivery_id, "selection of unknown delivery ignored");
            return false;
        }
        self.selection.delivery_id = Some(delivery_id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        self.selection = Selection::default();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        *self = snapshot.0;
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn route(&self, route_id: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.id == route_id)
    }

    pub fn unassigned(&self) -> &Route {
        &self.routes[0]
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn driver(&self, driver_id: &str) -> Option<&Driver> {
        self.drivers.iter().find(|d| d.id == driver_id)
    }

    pub fn depot(&self) -> &NamedLocation {
        &self.depot
    }

    pub fn solution(&self) -> Option<&Solution> {
        self.solution.as_ref()
    }

    pub fn routes_generated(&self) -> bool {
        self.routes_generated
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn all_deliveries(&self) -> impl Iterator<Item = &Delivery> {
        self.routes.iter().flat_map(|r| r.deliveries.iter())
    }

    pub fn delivery_count(&self) -> usize {
        self.routes.iter().map(|r| r.deliveries.len()).sum()
    }

    pub fn find_delivery(&self, delivery_id: &str) -> Option<(&Route, &Delivery)> {
        self.routes.iter().find_map(|route| {
            route
                .deliveries
                .iter()
                .find(|d| d.id == delivery_id)
                .map(|d| (route, d))
        })
    }

    /// Delivery id to the color of the route that currently holds it.
    pub fn delivery_color_map(&self) -> HashMap<String, String> {
        self.routes
            .iter()
            .flat_map(|route| {
                route
                    .deliveries
                    .iter()
                    .map(move |d| (d.id.clone(), route.color.clone()))
            })
            .collect()
    }

    /// Verifies the closed-world partition and the driver/route pairing.
    pub fn check_partition(&self) -> Result<(), String> {
        let unassigned_routes = self.routes.iter().filter(|r| r.is_unassigned()).count();
        if unassigned_routes != 1 {
            return Err(format!("expected one unassigned route, found {unassigned_routes}"));
        }
        if self.routes[0].id != UNASSIGNED_ROUTE_ID {
            return Err("unassigned route is not first".to_string());
        }

        let mut seen = HashSet::new();
        for delivery in self.all_deliveries() {
            if !seen.insert(delivery.id.as_str()) {
                return Err(format!("delivery {} appears in more than one slot", delivery.id));
            }
        }

        if self.routes.len() != self.drivers.len() + 1 {
            return Err(format!(
                "{} drivers but {} driver routes",
                self.drivers.len(),
                self.routes.len() - 1
            ));
        }
        for driver in &self.drivers {
            let owned = self
                .routes
                .iter()
                .filter(|r| r.driver_id.as_deref() == Some(driver.id.as_str()))
                .count();
            if owned != 1 {
                return Err(format!("driver {} owns {owned} routes", driver.id));
            }
        }

        Ok(())
    }

    fn unassigned_mut(&mut self) -> &mut Route {
        &mut self.routes[0]
    }

    fn mark_mutated(&mut self) {
        self.revision += 1;
        self.routes_generated = false;
        self.solution = None;
        self.prune_selection();
    }

    fn prune_selection(&mut self) {
        if let Some(route_id) = self.selection.route_id.clone() {
            if self.route(&route_id).is_none() {
                self.selection.route_id = None;
            }
        }
        if let Some(delivery_id) = self.selection.delivery_id.clone() {
            if self.find_delivery(&delivery_id).is_none() {
                self.selection.delivery_id = None;
            }
        }
    }
}

pub fn validate_driver(new_driver: &NewDriver) -> Result<(), AppError> {
    if new_driver.name.trim().is_empty() {
        return Err(AppError::Validation("driver name cannot be empty".to_string()));
    }
    if new_driver.email.trim().is_empty() {
        return Err(AppError::Validation("driver email cannot be empty".to_string()));
    }
    if !is_valid_email(new_driver.email.trim()) {
        return Err(AppError::Validation(format!(
            "invalid email address: {}",
            new_driver.email.trim()
        )));
    }
    Ok(())
}

/// `local@domain.tld` with no whitespace anywhere.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

fn sort_by_name(deliveries: &mut [Delivery]) {
    deliveries.sort_by(|a, b| a.name.cmp(&b.name));
}

fn dedupe_by_id(deliveries: Vec<Delivery>) -> Vec<Delivery> {
    let mut seen = HashSet::new();
    deliveries
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect()
}
