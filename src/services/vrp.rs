//! Client for the hosted vehicle-routing solver.
//!
//! Small problems go to the immediate endpoint and come back solved in the
//! response body. Larger ones are submitted as jobs and polled by
//! `engine::optimize`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::optimization::{JobStatus, OptimizationRequest, SolveResponse};

#[async_trait]
pub trait VrpClient: Send + Sync {
    /// Solve on the immediate endpoint.
    async fn solve(&self, request: &OptimizationRequest) -> Result<SolveResponse, AppError>;

    /// Submit to the long-running endpoint and return the job id.
    async fn submit_job(&self, request: &OptimizationRequest) -> Result<String, AppError>;

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError>;
}

#[derive(Debug, Deserialize)]
struct JobCreated {
    #[serde(default)]
    job_id: Option<String>,
}

pub struct RoutificClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RoutificClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("route-planner/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::ExternalService("routing api key is not configured".to_string())
        })
    }

    async fn post_request(
        &self,
        path: &str,
        request: &OptimizationRequest,
    ) -> Result<reqwest::Response, AppError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(url = %url, visits = request.visits.len(), "posting optimization request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key()?)
            .json(request)
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl VrpClient for RoutificClient {
    async fn solve(&self, request: &OptimizationRequest) -> Result<SolveResponse, AppError> {
        let response = self.post_request("vrp", request).await?;
        response
            .json::<SolveResponse>()
            .await
            .map_err(|err| AppError::ExternalService(format!("malformed optimizer response: {err}")))
    }

    async fn submit_job(&self, request: &OptimizationRequest) -> Result<String, AppError> {
        let response = self.post_request("vrp-long", request).await?;
        let created = response
            .json::<JobCreated>()
            .await
            .map_err(|err| AppError::ExternalService(format!("malformed job response: {err}")))?;

        created
            .job_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::ExternalService("optimizer did not return a job id".to_string()))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus, AppError> {
        let url = format!("{}/jobs/{job_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.api_key()?)
            .send()
            .await?;

        ensure_success(response)
            .await?
            .json::<JobStatus>()
            .await
            .map_err(|err| AppError::ExternalService(format!("malformed job status: {err}")))
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "optimizer request failed");
    Err(AppError::ExternalService(format!("optimizer returned {status}")))
}
