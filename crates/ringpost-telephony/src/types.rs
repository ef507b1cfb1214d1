// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call control API wire types not shared with the engine.
//!
//! Request and response bodies for originate and status reuse
//! [`OriginateRequest`](ringpost_core::types::OriginateRequest),
//! [`OriginateResponse`](ringpost_core::types::OriginateResponse) and
//! [`CallReport`](ringpost_core::types::CallReport) directly.

use serde::Deserialize;

/// Error envelope returned by the call control API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

impl ApiErrorResponse {
    /// Best-effort human-readable message from a response body.
    pub fn describe(status: reqwest::StatusCode, body: &str) -> String {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(parsed) => match parsed.error.code {
                Some(code) => format!("call API error ({code}): {}", parsed.error.message),
                None => format!("call API error: {}", parsed.error.message),
            },
            Err(_) if body.trim().is_empty() => format!("call API returned {status}"),
            Err(_) => format!("call API returned {status}: {body}"),
        }
    }
}
