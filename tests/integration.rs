use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use route_planner::api::rest::router;
use route_planner::error::AppError;
use route_planner::models::delivery::{Delivery, NewDelivery};
use route_planner::models::driver::{Driver, NewDriver};
use route_planner::models::location::NamedLocation;
use route_planner::models::optimization::{JobStatus, OptimizationRequest, SolveResponse, Stop};
use route_planner::services::email::RecordingEmailSender;
use route_planner::services::geocoding::MockGeocoder;
use route_planner::services::persistence::{InMemoryRepository, Repository};
use route_planner::services::vrp::VrpClient;
use route_planner::state::{AppState, ChangeKind, PlannerSettings, Services};
use serde_json::{json, Value};
use tower::ServiceExt;

/// In-memory persistence whose writes can be switched to fail or to never
/// answer.
#[derive(Default)]
struct FlakyRepository {
    inner: InMemoryRepository,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
}

impl FlakyRepository {
    async fn check(&self) -> Result<(), AppError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(AppError::ExternalService("persistence unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Repository for FlakyRepository {
    async fn list_deliveries(&self) -> Result<Vec<Delivery>, AppError> {
        self.inner.list_deliveries().await
    }

    async fn create_delivery(&self, delivery: NewDelivery) -> Result<Delivery, AppError> {
        self.check().await?;
        self.inner.create_delivery(delivery).await
    }

    async fn delete_delivery(&self, id: &str) -> Result<(), AppError> {
        self.check().await?;
        self.inner.delete_delivery(id).await
    }

    async fn delete_all_deliveries(&self) -> Result<(), AppError> {
        self.check().await?;
        self.inner.delete_all_deliveries().await
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>, AppError> {
        self.inner.list_drivers().await
    }

    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError> {
        self.check().await?;
        self.inner.create_driver(driver).await
    }

    async fn delete_driver(&self, id: &str) -> Result<(), AppError> {
        self.check().await?;
        self.inner.delete_driver(id).await
    }

    async fn delete_all_drivers(&self) -> Result<(), AppError> {
        self.check().await?;
        self.inner.delete_all_drivers().await
    }
}

/// Deals visits to vehicles round-robin; each vehicle's stops are 15 minutes
/// apart starting at 09:00, with 5 minutes of service.
struct RoundRobinSolver;

#[async_trait]
impl VrpClient for RoundRobinSolver {
    async fn solve(&self, request: &OptimizationRequest) -> Result<SolveResponse, AppError> {
        let vehicles: Vec<&String> = request.fleet.keys().collect();
        let mut routes: HashMap<String, Vec<Stop>> = vehicles
            .iter()
            .map(|id| {
                let start = Stop {
                    location_id: format!("{id}_start"),
                    location_name: None,
                    arrival_time: "08:45".to_string(),
                    finish_time: None,
                };
                ((*id).clone(), vec![start])
            })
            .collect();

        for (index, visit_id) in request.visits.keys().enumerate() {
            let vehicle = vehicles[index % vehicles.len()];
            let stops = routes.get_mut(vehicle).unwrap();
            let minute = 15 * (stops.len() - 1);
            stops.push(Stop {
                location_id: visit_id.clone(),
                location_name: None,
                arrival_time: format!("09:{minute:02}"),
                finish_time: Some(format!("09:{:02}", minute + 5)),
            });
        }

        Ok(SolveResponse {
            status: Some("success".to_string()),
            total_travel_time: Some(30.0),
            total_working_time: Some(60.0),
            solution: Some(routes),
        })
    }

    async fn submit_job(&self, _request: &OptimizationRequest) -> Result<String, AppError> {
        Err(AppError::ExternalService("long-running jobs not scripted".to_string()))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError> {
        Err(AppError::NotFound(format!("job {job_id}")))
    }
}

struct Harness {
    app: axum::Router,
    state: Arc<AppState>,
    repository: Arc<FlakyRepository>,
    email: Arc<RecordingEmailSender>,
}

fn depot() -> NamedLocation {
    NamedLocation {
        name: "Main Depot".to_string(),
        lat: 49.2827,
        lng: -123.1207,
    }
}

fn setup_with_email(email: RecordingEmailSender) -> Harness {
    let repository = Arc::new(FlakyRepository::default());
    let email = Arc::new(email);
    let services = Services {
        repository: repository.clone(),
        geocoder: Arc::new(MockGeocoder::new(depot()).with_unresolvable(["Nowhere Lane"])),
        vrp: Arc::new(RoundRobinSolver),
        email: email.clone(),
    };
    let settings = PlannerSettings {
        geocode_interval: Duration::ZERO,
        persistence_timeout: Duration::from_millis(200),
        ..PlannerSettings::default()
    };
    let state = Arc::new(AppState::new(services, settings, depot(), 64));

    Harness {
        app: router(state.clone()),
        state,
        repository,
        email,
    }
}

fn setup() -> Harness {
    setup_with_email(RecordingEmailSender::new())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn csv_request(uri: &str, csv: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "text/csv")
        .body(Body::from(csv.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    empty_request("GET", uri)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn add_driver(app: &axum::Router, name: &str, email: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": name, "email": email }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

async fn import(app: &axum::Router, csv: &str) -> Value {
    let response = app
        .clone()
        .oneshot(csv_request("/deliveries/import", csv))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn routes(app: &axum::Router) -> Value {
    let response = app.clone().oneshot(get_request("/routes")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

const FOUR_CUSTOMERS: &str = "Name,Address,Email\n\
    Ann,1 Main St,ann@example.com\n\
    Bea,2 Main St,bea@example.com\n\
    Cal,3 Main St,cal@example.com\n\
    Dee,4 Main St,dee@example.com\n";

#[tokio::test]
async fn health_returns_ok() {
    let harness = setup();
    let response = harness.app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["deliveries"], 0);
    assert_eq!(body["routes_generated"], false);
    assert_eq!(body["optimizing"], false);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;
    let response = harness.app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("store_drivers 1"));
}

#[tokio::test]
async fn create_driver_adds_empty_route_starting_at_depot() {
    let harness = setup();
    let driver = add_driver(&harness.app, "Alice", "alice@example.com").await;

    let id = driver["id"].as_str().unwrap();
    assert!(id.starts_with("drv-"));
    assert_eq!(driver["start_location"]["name"], "Main Depot");

    let body = routes(&harness.app).await;
    let list = body["routes"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], "unassigned-deliveries-route");
    assert_eq!(list[1]["id"], format!("route-for-driver-{id}"));
    assert_eq!(list[1]["driver_name"], "Alice");
    assert!(list[1]["deliveries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn create_driver_with_bad_email_returns_400() {
    let harness = setup();
    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": "Bob", "email": "bob at example" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("invalid email"));
    assert!(harness.state.store.lock().await.drivers().is_empty());
}

#[tokio::test]
async fn duplicate_driver_email_is_rolled_back_with_409() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({ "name": "Alice Two", "email": "alice@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let store = harness.state.store.lock().await;
    assert_eq!(store.drivers().len(), 1);
    assert_eq!(store.routes().len(), 2);
}

#[tokio::test]
async fn failed_persistence_restores_deleted_driver() {
    let harness = setup();
    let driver = add_driver(&harness.app, "Alice", "alice@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;
    let before = harness.state.store.lock().await.snapshot();

    harness.repository.fail_writes.store(true, Ordering::SeqCst);
    let id = driver["id"].as_str().unwrap();
    let response = harness
        .app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/drivers/{id}")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.state.store.lock().await.snapshot(), before);
}

#[tokio::test]
async fn stalled_persistence_times_out_and_releases_the_store() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;
    let before = harness.state.store.lock().await.snapshot();

    harness.repository.stall_writes.store(true, Ordering::SeqCst);
    let pending = tokio::spawn(harness.app.clone().oneshot(json_request(
        "POST",
        "/drivers",
        json!({ "name": "Bob", "email": "bob@example.com" }),
    )));

    let listed = tokio::time::timeout(Duration::from_secs(2), routes(&harness.app))
        .await
        .expect("GET /routes must answer once the write gives up");
    assert_eq!(listed["routes"].as_array().unwrap().len(), 2);

    let response = tokio::time::timeout(Duration::from_secs(2), pending)
        .await
        .expect("POST /drivers must give up")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("add_driver"));
    assert_eq!(harness.state.store.lock().await.snapshot(), before);
}

#[tokio::test]
async fn failed_persistence_drops_optimistic_delivery() {
    let harness = setup();
    harness.repository.fail_writes.store(true, Ordering::SeqCst);

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({ "name": "Ann", "address": "1 Main St", "email": "ann@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.state.store.lock().await.delivery_count(), 0);
}

#[tokio::test]
async fn create_delivery_geocodes_missing_coordinates() {
    let harness = setup();

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({ "name": "Ann", "address": "1 Main St", "email": "ann@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "Pending");
    assert_eq!(body["eta"], "N/A");
    assert!((body["location"]["lat"].as_f64().unwrap() - 49.2827).abs() < 0.11);

    let response = harness
        .app
        .clone()
        .oneshot(get_request("/deliveries"))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert_eq!(list[0]["id"], body["id"]);
    assert_eq!(list[0]["route_id"], "unassigned-deliveries-route");
}

#[tokio::test]
async fn unresolvable_address_is_a_502() {
    let harness = setup();

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/deliveries",
            json!({ "name": "Ann", "address": "Nowhere Lane", "email": "ann@example.com" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(harness.state.store.lock().await.delivery_count(), 0);
}

#[tokio::test]
async fn csv_import_accepts_valid_rows_and_reports_the_rest() {
    let harness = setup();
    let csv = "Name,Address,Email\n\
        Ann,1 Main St,ann@example.com\n\
        Bea,2 Main St,bea@example.com\n\
        Cal,,cal@example.com\n\
        Dee,4 Main St,dee@example.com\n\
        Eve,5 Main St,eve@example.com\n";

    let report = import(&harness.app, csv).await;

    assert_eq!(report["accepted_count"], 4);
    assert_eq!(report["rejected_count"], 1);
    assert_eq!(report["failures"][0]["row"], 3);
    assert_eq!(report["failures"][0]["record"]["Name"], "Cal");

    let body = routes(&harness.app).await;
    let unassigned = body["routes"][0]["deliveries"].as_array().unwrap();
    let names: Vec<&str> = unassigned
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ann", "Bea", "Dee", "Eve"]);
}

#[tokio::test]
async fn csv_import_records_geocoding_failures_per_row() {
    let harness = setup();
    let csv = "name,address,email,lat,lng\n\
        Ann,Nowhere Lane,ann@example.com,,\n\
        Bea,Nowhere Lane,bea@example.com,49.3,-123.2\n";

    let report = import(&harness.app, csv).await;

    assert_eq!(report["accepted_count"], 1);
    assert_eq!(report["rejected_count"], 0);
    assert_eq!(report["failures"].as_array().unwrap().len(), 1);
    assert_eq!(report["failures"][0]["row"], 1);
    assert_eq!(report["deliveries"][0]["location"]["lat"], 49.3);
}

#[tokio::test]
async fn unoptimized_routes_use_the_estimate() {
    let harness = setup();
    import(
        &harness.app,
        "Name,Address,Email\nAnn,1 Main St,a@x.com\nBea,2 Main St,b@x.com\nCal,3 Main St,c@x.com\n",
    )
    .await;

    let body = routes(&harness.app).await;
    let unassigned = &body["routes"][0];
    assert_eq!(unassigned["total_stops"], 3);
    assert_eq!(unassigned["total_duration"], "1h 0m");
    assert_eq!(unassigned["total_distance"], "15.5km");
    assert_eq!(unassigned["source"], "estimate");
}

#[tokio::test]
async fn cross_route_drag_changes_nothing() {
    let harness = setup();
    let driver = add_driver(&harness.app, "Alice", "alice@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;
    let before = harness.state.store.lock().await.snapshot();

    let first_id = before_first_delivery(&harness).await;
    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/routes/reorder",
            json!({
                "source_route_id": "unassigned-deliveries-route",
                "source_index": 0,
                "dest_route_id": format!("route-for-driver-{}", driver["id"].as_str().unwrap()),
                "dest_index": 0,
                "delivery_id": first_id,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["applied"], false);
    assert_eq!(harness.state.store.lock().await.snapshot(), before);
}

async fn before_first_delivery(harness: &Harness) -> String {
    harness.state.store.lock().await.unassigned().deliveries[0]
        .id
        .clone()
}

#[tokio::test]
async fn same_route_drag_reorders() {
    let harness = setup();
    import(&harness.app, FOUR_CUSTOMERS).await;
    let first_id = before_first_delivery(&harness).await;

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/routes/reorder",
            json!({
                "source_route_id": "unassigned-deliveries-route",
                "source_index": 0,
                "dest_route_id": "unassigned-deliveries-route",
                "dest_index": 3,
                "delivery_id": first_id,
            }),
        ))
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["applied"], true);
    assert_eq!(body["routes"][0]["deliveries"][3]["id"], first_id);
}

#[tokio::test]
async fn optimize_without_drivers_is_a_precondition_failure() {
    let harness = setup();
    import(&harness.app, FOUR_CUSTOMERS).await;

    let response = harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/optimize"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.state.active_run.lock().await.is_none());
}

#[tokio::test]
async fn unknown_run_returns_404() {
    let harness = setup();
    let response = harness
        .app
        .oneshot(get_request("/optimize/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finalize_and_export_require_optimized_routes() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;

    let finalize = harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/finalize"))
        .await
        .unwrap();
    let export = harness
        .app
        .clone()
        .oneshot(get_request("/export"))
        .await
        .unwrap();

    assert_eq!(finalize.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(export.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.email.sent().await.is_empty());
}

#[tokio::test]
async fn full_planning_flow() {
    let harness = setup_with_email(RecordingEmailSender::rejecting(["bea@example.com"]));
    let alice = add_driver(&harness.app, "Alice", "alice@example.com").await;
    add_driver(&harness.app, "Bob", "bob@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;

    let response = harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/optimize?wait=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let run = body_json(response).await;
    assert_eq!(run["status"], "succeeded");
    assert_eq!(run["variant"], "immediate");
    assert_eq!(run["outcome"]["assigned"], 4);
    assert_eq!(run["outcome"]["unassigned"], 0);

    let body = routes(&harness.app).await;
    assert_eq!(body["routes_generated"], true);
    let list = body["routes"].as_array().unwrap();
    assert!(list[0]["deliveries"].as_array().unwrap().is_empty());
    let alice_route = list
        .iter()
        .find(|r| r["driver_id"] == alice["id"])
        .unwrap();
    assert_eq!(alice_route["total_stops"], 2);
    assert_eq!(alice_route["total_duration"], "35m");
    assert_eq!(alice_route["source"], "optimizer");
    assert!(alice_route["total_distance"].is_null());
    assert_eq!(alice_route["deliveries"][0]["status"], "Scheduled");
    assert_eq!(alice_route["deliveries"][0]["eta"], "09:00");

    let response = harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/finalize"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["sent"], 3);
    assert_eq!(report["failures"][0]["to"], "bea@example.com");

    let sent = harness.email.sent().await;
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|n| n.summary.contains(" with ")));

    let response = harness
        .app
        .clone()
        .oneshot(get_request("/export"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let csv = body_string(response).await;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], r#""Route","Driver","Name","Address","Email","Status","ETA""#);
    assert_eq!(lines.len(), 5);
}

#[tokio::test]
async fn route_colors_survive_reoptimization() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;
    add_driver(&harness.app, "Bob", "bob@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;

    let colors = |body: &Value| -> Vec<(String, String)> {
        body["routes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| (r["id"].as_str().unwrap().to_string(), r["color"].as_str().unwrap().to_string()))
            .collect()
    };
    let before = colors(&routes(&harness.app).await);

    for _ in 0..2 {
        let response = harness
            .app
            .clone()
            .oneshot(empty_request("POST", "/optimize?wait=true"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(colors(&routes(&harness.app).await), before);
}

#[tokio::test]
async fn mutation_after_optimize_clears_generated_flag() {
    let harness = setup();
    add_driver(&harness.app, "Alice", "alice@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;
    harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/optimize?wait=true"))
        .await
        .unwrap();

    add_driver(&harness.app, "Bob", "bob@example.com").await;

    let body = routes(&harness.app).await;
    assert_eq!(body["routes_generated"], false);
    assert!(body["routes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["source"] == "estimate"));
}

#[tokio::test]
async fn deleting_a_driver_returns_deliveries_to_unassigned() {
    let harness = setup();
    let alice = add_driver(&harness.app, "Alice", "alice@example.com").await;
    import(&harness.app, FOUR_CUSTOMERS).await;
    harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/optimize?wait=true"))
        .await
        .unwrap();

    let id = alice["id"].as_str().unwrap();
    let response = harness
        .app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/drivers/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let store = harness.state.store.lock().await;
    assert_eq!(store.routes().len(), 1);
    assert_eq!(store.unassigned().deliveries.len(), 4);
    assert!(store.check_partition().is_ok());
}

#[tokio::test]
async fn store_changes_are_broadcast() {
    let harness = setup();
    let mut rx = harness.state.events_tx.subscribe();

    add_driver(&harness.app, "Alice", "alice@example.com").await;

    let event = rx.recv().await.unwrap();
    assert_eq!(event.kind, ChangeKind::DriverAdded);
    assert!(event.revision > 0);
}

#[tokio::test]
async fn map_highlights_the_selected_route() {
    let harness = setup();
    import(&harness.app, FOUR_CUSTOMERS).await;

    let response = harness
        .app
        .clone()
        .oneshot(empty_request("POST", "/selection/route/unassigned-deliveries-route"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let selection = body_json(response).await;
    assert_eq!(selection["route_id"], "unassigned-deliveries-route");

    let response = harness.app.clone().oneshot(get_request("/map")).await.unwrap();
    let map = body_json(response).await;
    let markers = map["markers"].as_array().unwrap();
    assert_eq!(markers.len(), 4);
    assert!(markers.iter().all(|m| m["highlighted"] == true));
    assert_eq!(map["depot"]["name"], "Main Depot");

    let missing = harness
        .app
        .oneshot(empty_request("POST", "/selection/route/nope"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn depot_can_be_updated() {
    let harness = setup();

    let bad = harness
        .app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/settings/depot",
            json!({ "name": " ", "lat": 1.0, "lng": 2.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

    let response = harness
        .app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/settings/depot",
            json!({ "name": "North Yard", "lat": 49.3, "lng": -123.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let driver = add_driver(&harness.app, "Alice", "alice@example.com").await;
    assert_eq!(driver["start_location"]["name"], "North Yard");
}

#[tokio::test]
async fn bootstrap_loads_persisted_records() {
    let harness = setup();
    harness
        .repository
        .create_driver(NewDriver {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone_number: None,
            identity_sub: None,
            start_location: None,
        })
        .await
        .unwrap();
    harness
        .repository
        .create_delivery(NewDelivery {
            name: "Ann".to_string(),
            address: "1 Main St".to_string(),
            email: "ann@example.com".to_string(),
            location: depot().point(),
            photo_url: None,
            notes: None,
            duration: None,
        })
        .await
        .unwrap();

    harness.state.bootstrap().await.unwrap();

    let body = routes(&harness.app).await;
    assert_eq!(body["routes"].as_array().unwrap().len(), 2);
    assert_eq!(body["routes"][0]["deliveries"][0]["name"], "Ann");
}
