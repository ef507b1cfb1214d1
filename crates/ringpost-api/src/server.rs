// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job control HTTP server built on axum.
//!
//! Sets up routes, middleware and shared state.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use ringpost_core::DialerError;
use ringpost_engine::CampaignOrchestrator;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: std::time::Instant::now(),
            prometheus_render,
        }
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: CampaignOrchestrator,
    pub auth: AuthConfig,
    pub health: HealthState,
}

/// Server bind address (mirrors `ApiConfig` from ringpost-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Build the application router.
///
/// - `GET /health`, `GET /metrics` (public)
/// - everything under `/v1` (bearer token, resolved to an owner)
pub fn router(state: ApiState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_public_health))
        .route("/metrics", get(handlers::get_public_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/campaigns/{campaign_id}/jobs", post(handlers::start_job))
        .route("/v1/jobs/{job_id}", get(handlers::get_job))
        .route("/v1/jobs/{job_id}/cancel", post(handlers::cancel_job))
        .route("/v1/jobs/{job_id}/pause", post(handlers::pause_job))
        .route("/v1/jobs/{job_id}/resume", post(handlers::resume_job))
        .route("/v1/jobs/{job_id}/attempts", get(handlers::list_attempts))
        .route("/v1/ports", get(handlers::list_ports))
        .route("/v1/ports/reset", post(handlers::reset_ports))
        .route("/v1/test-calls", post(handlers::make_test_call))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` is cancelled.
pub async fn start_server(
    config: &ServerConfig,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), DialerError> {
    if state.auth.is_empty() {
        tracing::warn!("no api tokens configured, every /v1 request will be rejected");
    }
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DialerError::Config(format!("failed to bind api to {addr}: {e}")))?;

    tracing::info!("API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| DialerError::Internal(format!("api server error: {e}")))?;

    tracing::info!("API server stopped");
    Ok(())
}
