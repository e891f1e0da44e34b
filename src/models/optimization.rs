use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Payload accepted by the hosted VRP solver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationRequest {
    pub visits: BTreeMap<String, VisitSpec>,
    pub fleet: BTreeMap<String, VehicleSpec>,
    pub options: RequestOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SolverLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitSpec {
    pub location: SolverLocation,
    pub duration: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSpec {
    pub start_location: SolverLocation,
    pub shift_start: String,
    pub shift_end: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestOptions {
    pub traffic: String,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            traffic: "normal".to_string(),
        }
    }
}

/// One stop in a vehicle's solved sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stop {
    pub location_id: String,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default)]
    pub arrival_time: String,
    #[serde(default)]
    pub finish_time: Option<String>,
}

impl Stop {
    /// The solver echoes each vehicle's start location as `<vehicle>_start`.
    pub fn is_start_placeholder(&self) -> bool {
        self.location_id.ends_with("_start")
    }
}

/// Solver output. Every field is optional because the payload is untrusted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SolveResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_travel_time: Option<f64>,
    #[serde(default)]
    pub total_working_time: Option<f64>,
    #[serde(default)]
    pub solution: Option<HashMap<String, Vec<Stop>>>,
}

/// A validated solver result: vehicle id to ordered stops.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Solution {
    pub routes: HashMap<String, Vec<Stop>>,
    pub total_travel_time: Option<f64>,
    pub total_working_time: Option<f64>,
}

impl Solution {
    pub fn stops_for(&self, driver_id: &str) -> Option<&[Stop]> {
        self.routes.get(driver_id).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Finished,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    pub status: JobState,
    #[serde(default)]
    pub output: Option<SolveResponse>,
    #[serde(default)]
    pub error: Option<String>,
}
