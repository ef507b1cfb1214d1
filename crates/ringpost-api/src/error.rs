// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from [`DialerError`] to HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ringpost_core::DialerError;
use serde::Serialize;

/// Error response body: a generic message plus the stable error code.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// Handler error wrapper.
#[derive(Debug)]
pub struct ApiError(pub DialerError);

impl From<DialerError> for ApiError {
    fn from(e: DialerError) -> Self {
        Self(e)
    }
}

pub fn status_for(error: &DialerError) -> StatusCode {
    match error {
        DialerError::NotFound { .. } | DialerError::PortNotFound { .. } => StatusCode::NOT_FOUND,
        DialerError::NotOwner { .. } => StatusCode::FORBIDDEN,
        DialerError::AlreadyRunning { .. }
        | DialerError::InvalidTransition { .. }
        | DialerError::PortUnavailable { .. } => StatusCode::CONFLICT,
        DialerError::InsufficientCapacity { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DialerError::InvalidEndpoint { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DialerError::GatewayUnavailable { .. } => StatusCode::BAD_GATEWAY,
        DialerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DialerError::StaleBusyPort { .. }
        | DialerError::Storage { .. }
        | DialerError::Config(_)
        | DialerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
        }
        let body = ErrorResponse {
            error: self.0.user_message().to_string(),
            code: self.0.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_errors_are_forbidden() {
        let e = DialerError::NotOwner {
            entity: "job",
            id: "j".into(),
        };
        assert_eq!(status_for(&e), StatusCode::FORBIDDEN);
    }

    #[test]
    fn conflicts() {
        let e = DialerError::AlreadyRunning {
            campaign_id: "c".into(),
            job_id: "j".into(),
        };
        assert_eq!(status_for(&e), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_errors_do_not_leak_details() {
        let e = DialerError::Internal("db path /var/lib/secret".into());
        let response = ApiError(e).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
