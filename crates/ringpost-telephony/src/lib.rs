// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP call gateway adapter for Ringpost.
//!
//! This crate implements [`CallGateway`] against a JSON call control API:
//! `POST /calls` to originate, `GET /calls/{id}` for status and
//! `DELETE /calls/{id}` to hang up.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use ringpost_config::model::TelephonyConfig;
use ringpost_core::error::DialerError;
use ringpost_core::traits::{CallGateway, PluginAdapter};
use ringpost_core::types::{
    AdapterType, CallReport, HealthStatus, OriginateRequest, OriginateResponse,
};
use tracing::{debug, info};

use crate::client::CallApiClient;

/// Call gateway backed by the HTTP call control API.
///
/// API key resolution order: config -> `RINGPOST_TELEPHONY_API_KEY` env var
/// (through the config layer) -> `TELEPHONY_API_KEY` env var -> none.
pub struct HttpCallGateway {
    client: CallApiClient,
}

impl HttpCallGateway {
    pub fn new(config: &TelephonyConfig) -> Result<Self, DialerError> {
        let api_key = resolve_api_key(&config.api_key);
        let client = CallApiClient::new(
            &config.base_url,
            api_key.as_deref(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        info!(
            base_url = client.base_url(),
            authenticated = api_key.is_some(),
            "call gateway initialized"
        );
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: CallApiClient) -> Self {
        Self { client }
    }
}

fn resolve_api_key(configured: &Option<String>) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("TELEPHONY_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

#[async_trait]
impl PluginAdapter for HttpCallGateway {
    fn name(&self) -> &str {
        "http"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, DialerError> {
        match self.client.ping().await {
            Ok(status) if status.is_success() => Ok(HealthStatus::Healthy),
            Ok(status) => Ok(HealthStatus::Degraded(format!("health endpoint returned {status}"))),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl CallGateway for HttpCallGateway {
    async fn originate(
        &self,
        request: &OriginateRequest,
    ) -> Result<OriginateResponse, DialerError> {
        debug!(
            port_number = request.port_number,
            campaign_id = %request.campaign_id,
            is_test = request.is_test,
            "originating call"
        );
        self.client.originate(request).await
    }

    async fn get_status(&self, call_id: &str) -> Result<CallReport, DialerError> {
        self.client.call_status(call_id).await
    }

    async fn cancel(&self, call_id: &str) -> Result<(), DialerError> {
        debug!(call_id, "hanging up call");
        self.client.hangup(call_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(base_url: &str) -> HttpCallGateway {
        HttpCallGateway::new(&TelephonyConfig {
            base_url: base_url.to_string(),
            api_key: Some("k".to_string()),
            request_timeout_secs: 2,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn health_check_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert_eq!(
            gateway(&server.uri()).health_check().await.unwrap(),
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn health_check_degraded_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        assert!(matches!(
            gateway(&server.uri()).health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_unhealthy() {
        let status = gateway("http://127.0.0.1:9").health_check().await.unwrap();
        assert!(matches!(status, HealthStatus::Unhealthy(_)));
    }

    #[test]
    fn configured_key_wins() {
        assert_eq!(
            resolve_api_key(&Some("from-config".into())).as_deref(),
            Some("from-config")
        );
    }

    #[test]
    fn adapter_metadata() {
        let gw = gateway("http://localhost");
        assert_eq!(gw.name(), "http");
        assert_eq!(gw.adapter_type(), AdapterType::Gateway);
    }
}
