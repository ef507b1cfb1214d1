// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the call control API.
//!
//! Provides [`CallApiClient`], which handles request construction, bearer
//! authentication, error mapping, and retry of status queries on transient
//! errors. Originate is never retried: a lost response may still have placed
//! the call.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use ringpost_core::DialerError;
use ringpost_core::types::{CallReport, OriginateRequest, OriginateResponse};
use tracing::{debug, warn};

use crate::types::ApiErrorResponse;

/// Delay before retrying a transient status-query failure.
const RETRY_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct CallApiClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl CallApiClient {
    /// Creates a client for `base_url` (e.g. `https://pbx.example.com/api`).
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, DialerError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| DialerError::Config(format!("invalid API key header value: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| DialerError::GatewayUnavailable {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base}/calls`.
    pub async fn originate(
        &self,
        request: &OriginateRequest,
    ) -> Result<OriginateResponse, DialerError> {
        let response = self
            .client
            .post(format!("{}/calls", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(unreachable_error)?;

        let status = response.status();
        debug!(status = %status, port_number = request.port_number, "originate response received");
        if status.is_success() {
            return response.json::<OriginateResponse>().await.map_err(body_error);
        }

        let body = response.text().await.unwrap_or_default();
        let message = ApiErrorResponse::describe(status, &body);
        match status {
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(DialerError::InvalidEndpoint { message })
            }
            _ => Err(DialerError::GatewayUnavailable {
                message,
                source: None,
            }),
        }
    }

    /// `GET {base}/calls/{id}`. Retries once on transient errors.
    pub async fn call_status(&self, call_id: &str) -> Result<CallReport, DialerError> {
        let url = format!("{}/calls/{call_id}", self.base_url);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, call_id, "retrying status query after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let response = match self.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = Some(unreachable_error(e));
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.json::<CallReport>().await.map_err(body_error);
            }

            let body = response.text().await.unwrap_or_default();
            let message = ApiErrorResponse::describe(status, &body);
            if status == StatusCode::NOT_FOUND {
                return Err(DialerError::InvalidEndpoint { message });
            }
            let error = DialerError::GatewayUnavailable {
                message,
                source: None,
            };
            if !is_transient_error(status) {
                return Err(error);
            }
            last_error = Some(error);
        }

        Err(last_error.unwrap_or_else(|| DialerError::GatewayUnavailable {
            message: "status query failed after retries".into(),
            source: None,
        }))
    }

    /// `DELETE {base}/calls/{id}`. A call the API no longer knows is already gone.
    pub async fn hangup(&self, call_id: &str) -> Result<(), DialerError> {
        let response = self
            .client
            .delete(format!("{}/calls/{call_id}", self.base_url))
            .send()
            .await
            .map_err(unreachable_error)?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(DialerError::GatewayUnavailable {
            message: ApiErrorResponse::describe(status, &body),
            source: None,
        })
    }

    /// `GET {base}/health`.
    pub async fn ping(&self) -> Result<StatusCode, DialerError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(unreachable_error)?;
        Ok(response.status())
    }
}

fn unreachable_error(e: reqwest::Error) -> DialerError {
    DialerError::GatewayUnavailable {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

fn body_error(e: reqwest::Error) -> DialerError {
    DialerError::GatewayUnavailable {
        message: format!("failed to parse call API response: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Returns true for HTTP status codes that indicate transient errors worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringpost_core::types::{AmdResult, LegState};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> CallApiClient {
        CallApiClient::new(base_url, Some("test-key"), Duration::from_secs(5)).unwrap()
    }

    fn test_request() -> OriginateRequest {
        OriginateRequest {
            phone_number: "+15551230000".into(),
            transfer_number: "+15559990000".into(),
            greeting_audio_url: "https://audio.example/hello.wav".into(),
            port_number: 3,
            campaign_id: "camp-1".into(),
            is_test: false,
        }
    }

    #[tokio::test]
    async fn originate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "phone_number": "+15551230000",
                "port_number": 3,
                "is_test": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"call_id": "leg-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.originate(&test_request()).await.unwrap();
        assert_eq!(response.call_id, "leg-9");
    }

    #[tokio::test]
    async fn originate_422_is_invalid_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "error": {"code": "bad_number", "message": "not dialable"}
            })))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .originate(&test_request())
            .await
            .unwrap_err();
        match err {
            DialerError::InvalidEndpoint { message } => assert!(message.contains("bad_number")),
            other => panic!("expected InvalidEndpoint, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn originate_5xx_is_unavailable_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .originate(&test_request())
            .await
            .unwrap_err();
        assert!(matches!(err, DialerError::GatewayUnavailable { .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_unavailable() {
        // Port 9 (discard) on localhost is almost never listening.
        let client = test_client("http://127.0.0.1:9");
        let err = client.originate(&test_request()).await.unwrap_err();
        assert!(matches!(err, DialerError::GatewayUnavailable { .. }));
    }

    #[tokio::test]
    async fn call_status_parses_report() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls/leg-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "call_id": "leg-1",
                "state": "completed",
                "amd": "human",
                "digit": "1",
                "transfer_answered": true,
                "duration_seconds": 42
            })))
            .mount(&server)
            .await;

        let report = test_client(&server.uri()).call_status("leg-1").await.unwrap();
        assert_eq!(report.state, LegState::Completed);
        assert_eq!(report.amd, Some(AmdResult::Human));
        assert_eq!(report.digit.as_deref(), Some("1"));
        assert!(report.transfer_answered);
        assert_eq!(report.duration_seconds, 42);
    }

    #[tokio::test]
    async fn call_status_retries_once_on_503() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls/leg-2"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calls/leg-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "call_id": "leg-2",
                "state": "ringing"
            })))
            .mount(&server)
            .await;

        let report = test_client(&server.uri()).call_status("leg-2").await.unwrap();
        assert_eq!(report.state, LegState::Ringing);
        assert_eq!(report.amd, None);
    }

    #[tokio::test]
    async fn call_status_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls/leg-3"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = test_client(&server.uri()).call_status("leg-3").await.unwrap_err();
        assert!(matches!(err, DialerError::GatewayUnavailable { .. }));
    }

    #[tokio::test]
    async fn hangup_treats_404_as_done() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/calls/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calls/live"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/calls/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert!(client.hangup("gone").await.is_ok());
        assert!(client.hangup("live").await.is_ok());
        assert!(client.hangup("broken").await.is_err());
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = CallApiClient::new("https://pbx.example.com/api/", None, Duration::from_secs(1))
            .unwrap();
        assert_eq!(client.base_url(), "https://pbx.example.com/api");
    }
}
