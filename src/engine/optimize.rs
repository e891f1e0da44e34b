//! Optimization runs: build a request, call the solver, apply the result.
//!
//! One run may be in flight at a time. The store lock is taken only to build
//! the request and to apply the solution, never across the solver call.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::mapper::{apply_solution, validate_response, ApplyOutcome};
use crate::engine::request::{build_request, EndpointVariant};
use crate::error::AppError;
use crate::models::optimization::{JobState, OptimizationRequest, SolveResponse};
use crate::state::{ActiveRun, AppState, ChangeKind};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded { outcome: ApplyOutcome },
    Failed { error: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OptimizationRun {
    pub id: Uuid,
    pub variant: EndpointVariant,
    pub visits: usize,
    pub vehicles: usize,
    pub job_id: Option<String>,
    pub polls: u32,
    #[serde(flatten)]
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl OptimizationRun {
    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }
}

#[derive(Debug)]
enum SolveOutcome {
    Solved(SolveResponse),
    Cancelled,
}

fn variant_label(variant: EndpointVariant) -> &'static str {
    match variant {
        EndpointVariant::Immediate => "immediate",
        EndpointVariant::LongRunning => "long_running",
    }
}

/// Registers and spawns a run. Precondition failures surface here, before
/// anything is spawned.
pub async fn start_optimization(
    state: Arc<AppState>,
) -> Result<(OptimizationRun, JoinHandle<()>), AppError> {
    let mut active = state.active_run.lock().await;
    if let Some(current) = active.as_ref() {
        return Err(AppError::Conflict(format!(
            "optimization run {} is already in progress",
            current.id
        )));
    }

    let request = {
        let store = state.store.lock().await;
        build_request(&store, &state.settings.shift)?
    };

    let variant =
        EndpointVariant::for_visit_count(request.visits.len(), state.settings.long_running_threshold);
    let run = OptimizationRun {
        id: Uuid::new_v4(),
        variant,
        visits: request.visits.len(),
        vehicles: request.fleet.len(),
        job_id: None,
        polls: 0,
        state: RunState::Running,
        started_at: Utc::now(),
        finished_at: None,
    };

    let cancel = CancellationToken::new();
    state.runs.insert(run.id, run.clone());
    *active = Some(ActiveRun {
        id: run.id,
        cancel: cancel.clone(),
    });
    drop(active);

    info!(
        run_id = %run.id,
        variant = variant_label(variant),
        visits = run.visits,
        vehicles = run.vehicles,
        "optimization started"
    );

    let handle = tokio::spawn(execute_run(state, run.id, request, variant, cancel));
    Ok((run, handle))
}

pub fn get_run(state: &AppState, run_id: Uuid) -> Result<OptimizationRun, AppError> {
    state
        .runs
        .get(&run_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("optimization run {run_id} not found")))
}

/// Requests cancellation of a running run. Finished runs are left as they are.
pub async fn cancel_run(state: &AppState, run_id: Uuid) -> Result<OptimizationRun, AppError> {
    let run = get_run(state, run_id)?;
    if !run.is_running() {
        return Err(AppError::Conflict(format!(
            "optimization run {run_id} has already finished"
        )));
    }

    if let Some(active) = state.active_run.lock().await.as_ref() {
        if active.id == run_id {
            active.cancel.cancel();
            info!(run_id = %run_id, "optimization cancellation requested");
        }
    }

    Ok(run)
}

async fn execute_run(
    state: Arc<AppState>,
    run_id: Uuid,
    request: OptimizationRequest,
    variant: EndpointVariant,
    cancel: CancellationToken,
) {
    let started = Instant::now();

    let final_state = match solve(&state, run_id, &request, variant, &cancel).await {
        Ok(SolveOutcome::Solved(response)) => apply_response(&state, response, &cancel).await,
        Ok(SolveOutcome::Cancelled) => RunState::Cancelled,
        Err(err) => RunState::Failed {
            error: err.to_string(),
        },
    };

    let outcome = match &final_state {
        RunState::Succeeded { .. } => "succeeded",
        RunState::Failed { error } => {
            error!(run_id = %run_id, error = %error, "optimization failed");
            "failed"
        }
        RunState::Cancelled => {
            info!(run_id = %run_id, "optimization cancelled");
            "cancelled"
        }
        RunState::Running => "running",
    };
    state
        .metrics
        .optimization_runs_total
        .with_label_values(&[outcome])
        .inc();
    state
        .metrics
        .optimization_latency_seconds
        .with_label_values(&[variant_label(variant)])
        .observe(started.elapsed().as_secs_f64());

    if let Some(mut run) = state.runs.get_mut(&run_id) {
        run.state = final_state;
        run.finished_at = Some(Utc::now());
    }

    let mut active = state.active_run.lock().await;
    if active.as_ref().is_some_and(|a| a.id == run_id) {
        *active = None;
    }
    drop(active);

    evict_finished_runs(&state);
}

/// Drops the oldest finished runs beyond the retention limit. The newest
/// finished run is always kept.
fn evict_finished_runs(state: &AppState) {
    let mut finished: Vec<(DateTime<Utc>, Uuid)> = state
        .runs
        .iter()
        .filter_map(|entry| entry.finished_at.map(|at| (at, *entry.key())))
        .collect();

    let excess = finished
        .len()
        .saturating_sub(state.settings.retained_runs.max(1));
    if excess == 0 {
        return;
    }

    finished.sort();
    for (_, run_id) in finished.into_iter().take(excess) {
        state.runs.remove(&run_id);
    }
    debug!(evicted = excess, "finished optimization runs evicted");
}

async fn apply_response(
    state: &AppState,
    response: SolveResponse,
    cancel: &CancellationToken,
) -> RunState {
    let solution = match validate_response(response) {
        Ok(solution) => solution,
        Err(err) => {
            return RunState::Failed {
                error: err.to_string(),
            }
        }
    };

    let mut store = state.store.lock().await;
    if cancel.is_cancelled() {
        return RunState::Cancelled;
    }

    let outcome = apply_solution(&mut store, solution);
    state.publish(&store, ChangeKind::RoutesOptimized);
    RunState::Succeeded { outcome }
}

async fn solve(
    state: &AppState,
    run_id: Uuid,
    request: &OptimizationRequest,
    variant: EndpointVariant,
    cancel: &CancellationToken,
) -> Result<SolveOutcome, AppError> {
    let vrp = state.services.vrp.as_ref();

    match variant {
        EndpointVariant::Immediate => tokio::select! {
            _ = cancel.cancelled() => Ok(SolveOutcome::Cancelled),
            response = vrp.solve(request) => response.map(SolveOutcome::Solved),
        },
        EndpointVariant::LongRunning => {
            let job_id = tokio::select! {
                _ = cancel.cancelled() => return Ok(SolveOutcome::Cancelled),
                job_id = vrp.submit_job(request) => job_id?,
            };

            if let Some(mut run) = state.runs.get_mut(&run_id) {
                run.job_id = Some(job_id.clone());
            }
            info!(run_id = %run_id, job_id = %job_id, "optimization job submitted");

            poll_job(state, run_id, &job_id, cancel).await
        }
    }
}

/// Polls the job on a fixed interval until it finishes, errors, is
/// cancelled, or hits the attempt ceiling.
async fn poll_job(
    state: &AppState,
    run_id: Uuid,
    job_id: &str,
    cancel: &CancellationToken,
) -> Result<SolveOutcome, AppError> {
    let interval = state.settings.poll_interval;
    let max_attempts = state.settings.max_poll_attempts;
    let mut attempts: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(SolveOutcome::Cancelled),
            _ = sleep(interval) => {}
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return Ok(SolveOutcome::Cancelled),
            status = state.services.vrp.job_status(job_id) => status?,
        };
        attempts += 1;

        let label = match status.status {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Finished => "finished",
            JobState::Error => "error",
        };
        state
            .metrics
            .optimization_polls_total
            .with_label_values(&[label])
            .inc();
        if let Some(mut run) = state.runs.get_mut(&run_id) {
            run.polls = attempts;
        }

        match status.status {
            JobState::Finished => {
                return status.output.map(SolveOutcome::Solved).ok_or_else(|| {
                    AppError::ExternalService(format!("job {job_id} finished without output"))
                });
            }
            JobState::Error => {
                return Err(AppError::ExternalService(format!(
                    "job {job_id} failed: {}",
                    status.error.unwrap_or_else(|| "no reason given".to_string())
                )));
            }
            JobState::Pending | JobState::Processing => {}
        }

        if max_attempts > 0 && attempts >= max_attempts {
            warn!(run_id = %run_id, job_id = %job_id, attempts, "giving up on optimization job");
            return Err(AppError::ExternalService(format!(
                "job {job_id} did not finish after {attempts} polls"
            )));
        }
    }
}
