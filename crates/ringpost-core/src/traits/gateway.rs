// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call gateway trait for the external telephony control plane.

use async_trait::async_trait;

use crate::error::DialerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CallReport, OriginateRequest, OriginateResponse};

/// Adapter for the telephony control plane that places and tracks call legs.
///
/// Once a call is accepted the gateway answers, runs answering-machine
/// detection, plays the greeting only to a human, waits a bounded window for
/// one DTMF digit, and bridges to the transfer number when the digit is `1`.
/// Completion is discovered by polling [`get_status`](CallGateway::get_status);
/// push notifications are not assumed to arrive.
#[async_trait]
pub trait CallGateway: PluginAdapter {
    /// Places a call. Fails with `GatewayUnavailable` or `InvalidEndpoint`.
    async fn originate(&self, request: &OriginateRequest)
    -> Result<OriginateResponse, DialerError>;

    /// Returns the current (terminal or non-terminal) state of a call.
    async fn get_status(&self, call_id: &str) -> Result<CallReport, DialerError>;

    /// Best-effort hangup. Callers must not depend on it succeeding.
    async fn cancel(&self, call_id: &str) -> Result<(), DialerError>;
}
