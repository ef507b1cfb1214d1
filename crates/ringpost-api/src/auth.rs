// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token authentication for the job control API.
//!
//! Each configured token maps to one owner id. The middleware resolves the
//! token and attaches an [`Owner`] extension that handlers use for every
//! ownership check. When no tokens are configured, all requests are rejected
//! (fail-closed).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

/// The authenticated caller, inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

/// Token to owner-id map used by [`auth_middleware`].
#[derive(Clone, Default)]
pub struct AuthConfig {
    tokens: Arc<BTreeMap<String, String>>,
}

impl AuthConfig {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The owner a bearer token authorizes, if any.
    pub fn owner_for(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

/// Middleware that resolves `Authorization: Bearer <token>` to an [`Owner`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.is_empty() {
        tracing::error!("api has no tokens configured -- rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let owner = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth.owner_for(token))
        .map(|owner| Owner(owner.to_string()));

    match owner {
        Some(owner) => {
            request.extensions_mut().insert(owner);
            Ok(next.run(request).await)
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "request rejected: bad or missing bearer token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(BTreeMap::from([
            ("tok-a".to_string(), "owner-a".to_string()),
            ("tok-b".to_string(), "owner-b".to_string()),
        ]))
    }

    #[test]
    fn resolves_owner_by_token() {
        let auth = config();
        assert_eq!(auth.owner_for("tok-a"), Some("owner-a"));
        assert_eq!(auth.owner_for("tok-b"), Some("owner-b"));
        assert_eq!(auth.owner_for("nope"), None);
    }

    #[test]
    fn default_config_is_empty() {
        assert!(AuthConfig::default().is_empty());
    }

    #[test]
    fn debug_redacts_tokens() {
        let debug_output = format!("{:?}", config());
        assert!(!debug_output.contains("tok-a"));
        assert!(debug_output.contains("2 redacted"));
    }
}
