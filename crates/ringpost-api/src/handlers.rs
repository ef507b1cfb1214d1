// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the job control API.
//!
//! Every `/v1` handler acts as the [`Owner`] resolved by the auth middleware.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ringpost_core::{CallAttempt, DialerJob, JobStatus, Port};
use ringpost_engine::TestCall;
use serde::{Deserialize, Serialize};

use crate::auth::Owner;
use crate::error::ApiError;
use crate::server::ApiState;

/// Request body for POST /v1/campaigns/{campaign_id}/jobs.
#[derive(Debug, Default, Deserialize)]
pub struct StartJobRequest {
    /// Defaults to the number of ports available at start.
    #[serde(default)]
    pub max_concurrent_calls: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub total_calls: u32,
    pub max_concurrent_calls: u32,
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub success: bool,
    pub job: DialerJob,
}

#[derive(Debug, Serialize)]
pub struct AttemptsResponse {
    pub job_id: String,
    pub attempts: Vec<CallAttempt>,
}

#[derive(Debug, Serialize)]
pub struct PortListResponse {
    pub ports: Vec<Port>,
}

#[derive(Debug, Serialize)]
pub struct ResetPortsResponse {
    pub reset: usize,
}

/// Request body for POST /v1/test-calls.
#[derive(Debug, Deserialize)]
pub struct TestCallRequest {
    pub campaign_id: String,
    pub phone_number: String,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_jobs: usize,
}

type ApiResult<T> = Result<T, ApiError>;

/// POST /v1/campaigns/{campaign_id}/jobs
pub async fn start_job(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(campaign_id): Path<String>,
    body: Option<Json<StartJobRequest>>,
) -> ApiResult<(StatusCode, Json<StartJobResponse>)> {
    let Json(body) = body.unwrap_or_default();
    let job = state
        .orchestrator
        .start(&campaign_id, &owner, body.max_concurrent_calls)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(StartJobResponse {
            job_id: job.id,
            status: job.status,
            total_calls: job.total_calls,
            max_concurrent_calls: job.max_concurrent_calls,
        }),
    ))
}

/// GET /v1/jobs/{job_id}
pub async fn get_job(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DialerJob>> {
    Ok(Json(state.orchestrator.status(&job_id, &owner).await?))
}

/// POST /v1/jobs/{job_id}/cancel
pub async fn cancel_job(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let job = state.orchestrator.cancel(&job_id, &owner).await?;
    Ok(Json(CancelJobResponse { success: true, job }))
}

/// POST /v1/jobs/{job_id}/pause
pub async fn pause_job(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DialerJob>> {
    Ok(Json(state.orchestrator.pause(&job_id, &owner).await?))
}

/// POST /v1/jobs/{job_id}/resume
pub async fn resume_job(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<DialerJob>> {
    Ok(Json(state.orchestrator.resume(&job_id, &owner).await?))
}

/// GET /v1/jobs/{job_id}/attempts
pub async fn list_attempts(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<AttemptsResponse>> {
    let attempts = state.orchestrator.attempts(&job_id, &owner).await?;
    Ok(Json(AttemptsResponse { job_id, attempts }))
}

/// GET /v1/ports
pub async fn list_ports(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<Json<PortListResponse>> {
    let ports = state.orchestrator.registry().list_ports(&owner).await?;
    Ok(Json(PortListResponse { ports }))
}

/// POST /v1/ports/reset
pub async fn reset_ports(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
) -> ApiResult<Json<ResetPortsResponse>> {
    let reset = state.orchestrator.registry().reset_all(&owner).await?;
    Ok(Json(ResetPortsResponse { reset }))
}

/// POST /v1/test-calls
pub async fn make_test_call(
    State(state): State<ApiState>,
    Extension(Owner(owner)): Extension<Owner>,
    Json(body): Json<TestCallRequest>,
) -> ApiResult<(StatusCode, Json<TestCall>)> {
    let call = state
        .orchestrator
        .make_test_call(&owner, &body.campaign_id, &body.phone_number)
        .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

/// GET /health
///
/// Unauthenticated liveness.
pub async fn get_public_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        active_jobs: state.orchestrator.active_loops(),
    })
}

/// GET /metrics
///
/// Prometheus text exposition when a recorder is installed, 404 otherwise.
pub async fn get_public_metrics(State(state): State<ApiState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_defaults_concurrency() {
        let req: StartJobRequest = serde_json::from_str("{}").unwrap();
        assert!(req.max_concurrent_calls.is_none());
        let req: StartJobRequest = serde_json::from_str(r#"{"max_concurrent_calls": 3}"#).unwrap();
        assert_eq!(req.max_concurrent_calls, Some(3));
    }

    #[test]
    fn test_call_request_requires_both_fields() {
        assert!(serde_json::from_str::<TestCallRequest>(r#"{"campaign_id": "c"}"#).is_err());
        let req: TestCallRequest =
            serde_json::from_str(r#"{"campaign_id": "c", "phone_number": "+1555"}"#).unwrap();
        assert_eq!(req.phone_number, "+1555");
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok".to_string(),
            version: "0.1.0".to_string(),
            uptime_secs: 42,
            active_jobs: 2,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
        assert!(json.contains("\"active_jobs\":2"));
    }
}
