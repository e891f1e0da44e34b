use std::collections::HashSet;

use chrono::{NaiveTime, Timelike};
use tracing::warn;

use crate::models::optimization::{Solution, Stop};
use crate::models::route::{Route, RouteSummary, RouteView, SummarySource};
use crate::store::RouteStore;

const BASE_DURATION_MINUTES: i64 = 20;
const SERVICE_MINUTES_PER_STOP: i64 = 10;
const TRAVEL_MINUTES_BETWEEN_STOPS: i64 = 5;
const BASE_DISTANCE_KM: f64 = 5.0;
const DISTANCE_KM_PER_STOP: f64 = 3.5;

/// Every route with freshly derived aggregates, in store order.
pub fn summarize_routes(store: &RouteStore) -> Vec<RouteView> {
    store
        .routes()
        .iter()
        .map(|route| RouteView {
            route: route.clone(),
            summary: summarize(route, store.solution()),
        })
        .collect()
}

pub fn summarize(route: &Route, solution: Option<&Solution>) -> RouteSummary {
    let stops = route.deliveries.len();

    let timed = route
        .driver_id
        .as_deref()
        .and_then(|driver_id| solution?.stops_for(driver_id))
        .and_then(|stops| optimizer_duration_minutes(&kept_stops(route, stops)));

    match timed {
        Some(minutes) => {
            if minutes < 0 {
                warn!(route_id = %route.id, minutes, "optimizer timing crosses midnight; duration is negative");
            }
            RouteSummary {
                total_stops: stops,
                duration_minutes: minutes,
                total_duration: format_duration(minutes),
                distance_km: None,
                total_distance: None,
                source: SummarySource::Optimizer,
            }
        }
        None => {
            let minutes = estimate_duration_minutes(stops);
            let km = estimate_distance_km(stops);
            RouteSummary {
                total_stops: stops,
                duration_minutes: minutes,
                total_duration: format_duration(minutes),
                distance_km: Some(km),
                total_distance: Some(format_distance(km)),
                source: SummarySource::Estimate,
            }
        }
    }
}

/// The vehicle's start entry plus the first placement of each delivery the
/// route holds. Unknown and repeated stops were dropped when the solution was
/// applied, so they do not count toward the timing either.
fn kept_stops(route: &Route, stops: &[Stop]) -> Vec<Stop> {
    let owned: HashSet<&str> = route.deliveries.iter().map(|d| d.id.as_str()).collect();
    let mut seen = HashSet::new();
    stops
        .iter()
        .filter(|stop| {
            stop.is_start_placeholder()
                || (owned.contains(stop.location_id.as_str())
                    && seen.insert(stop.location_id.as_str()))
        })
        .cloned()
        .collect()
}

/// Rough placeholder used until an optimizer solution exists.
pub fn estimate_duration_minutes(stops: usize) -> i64 {
    let stops = stops as i64;
    BASE_DURATION_MINUTES
        + stops * SERVICE_MINUTES_PER_STOP
        + (stops - 1).max(0) * TRAVEL_MINUTES_BETWEEN_STOPS
}

pub fn estimate_distance_km(stops: usize) -> f64 {
    BASE_DISTANCE_KM + stops as f64 * DISTANCE_KM_PER_STOP
}

/// Span from the first stop's arrival to the last stop's finish. `None` when
/// there are no stops or a time label does not parse.
pub fn optimizer_duration_minutes(stops: &[Stop]) -> Option<i64> {
    let first = stops.first()?;
    let last = stops.last()?;
    if stops.len() == 1 {
        return Some(0);
    }

    let start = clock_minutes(&first.arrival_time)?;
    let end_label = last
        .finish_time
        .as_deref()
        .filter(|label| !label.trim().is_empty())
        .unwrap_or(&last.arrival_time);
    let end = clock_minutes(end_label)?;

    Some(end - start)
}

/// `HH:MM` to minutes since midnight.
pub fn clock_minutes(label: &str) -> Option<i64> {
    let time = NaiveTime::parse_from_str(label.trim(), "%H:%M").ok()?;
    Some(i64::from(time.hour()) * 60 + i64::from(time.minute()))
}

pub fn format_duration(minutes: i64) -> String {
    if minutes < 0 {
        return format!("-{}", format_duration(-minutes));
    }

    let hours = minutes / 60;
    let rest = minutes % 60;
    if hours > 0 {
        format!("{hours}h {rest}m")
    } else {
        format!("{rest}m")
    }
}

pub fn format_distance(km: f64) -> String {
    format!("{km:.1}km")
}
