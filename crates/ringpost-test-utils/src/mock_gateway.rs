// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock call gateway for deterministic testing.
//!
//! `MockGateway` implements `CallGateway` with per-number scripts: how the
//! originate request is answered, how many status polls a leg stays ringing,
//! and what the final report says. It also counts calls and tracks the peak
//! number of live legs so tests can assert concurrency limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ringpost_core::traits::adapter::PluginAdapter;
use ringpost_core::traits::gateway::CallGateway;
use ringpost_core::types::{
    AdapterType, AmdResult, CallReport, HealthStatus, LegState, OriginateRequest,
    OriginateResponse,
};
use ringpost_core::DialerError;

/// How the gateway answers an originate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Originate {
    Accept,
    /// Fails with `GatewayUnavailable`.
    Unavailable,
    /// Fails with `InvalidEndpoint`.
    Reject,
    /// Sleeps before accepting, to exercise originate timeouts.
    Stall(Duration),
}

/// Scripted behavior for calls to one number.
#[derive(Debug, Clone)]
pub struct CallScript {
    pub originate: Originate,
    /// Status polls answered with `ringing` before the final report.
    pub rings: u32,
    /// Never reaches a terminal state on its own.
    pub hangs: bool,
    pub state: LegState,
    pub amd: Option<AmdResult>,
    pub digit: Option<String>,
    pub transfer_answered: bool,
    pub duration_seconds: u32,
}

impl CallScript {
    fn completed(amd: AmdResult) -> Self {
        Self {
            originate: Originate::Accept,
            rings: 1,
            hangs: false,
            state: LegState::Completed,
            amd: Some(amd),
            digit: None,
            transfer_answered: false,
            duration_seconds: 12,
        }
    }

    /// A person answers and hangs up without pressing anything.
    pub fn human() -> Self {
        Self::completed(AmdResult::Human)
    }

    /// A person answers, presses 1 and the transfer connects.
    pub fn transferred() -> Self {
        Self {
            digit: Some("1".to_string()),
            transfer_answered: true,
            duration_seconds: 45,
            ..Self::completed(AmdResult::Human)
        }
    }

    pub fn voicemail() -> Self {
        Self::completed(AmdResult::Machine)
    }

    pub fn no_answer() -> Self {
        Self {
            state: LegState::NoAnswer,
            amd: None,
            duration_seconds: 0,
            ..Self::completed(AmdResult::Unknown)
        }
    }

    /// Rings forever until cancelled.
    pub fn hangs() -> Self {
        Self {
            hangs: true,
            ..Self::human()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            originate: Originate::Unavailable,
            ..Self::human()
        }
    }

    pub fn rejected() -> Self {
        Self {
            originate: Originate::Reject,
            ..Self::human()
        }
    }

    pub fn stalls(delay: Duration) -> Self {
        Self {
            originate: Originate::Stall(delay),
            ..Self::human()
        }
    }

    /// Number of `ringing` polls before the final report.
    pub fn after_rings(mut self, rings: u32) -> Self {
        self.rings = rings;
        self
    }
}

#[derive(Debug, Clone)]
struct Leg {
    request: OriginateRequest,
    script: CallScript,
    polls: u32,
    ended: bool,
    cancelled: bool,
}

#[derive(Default)]
struct State {
    scripts: HashMap<String, CallScript>,
    legs: HashMap<String, Leg>,
    originates: Vec<OriginateRequest>,
    status_failures: u32,
    peak_live: usize,
}

impl State {
    fn live(&self) -> usize {
        self.legs.values().filter(|l| !l.ended).count()
    }
}

/// A mock gateway driven by per-number [`CallScript`]s.
///
/// Numbers without a script use the default script ([`CallScript::human`]
/// unless overridden).
#[derive(Clone)]
pub struct MockGateway {
    state: Arc<Mutex<State>>,
    default_script: CallScript,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::with_default(CallScript::human())
    }

    pub fn with_default(default_script: CallScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            default_script,
        }
    }

    /// Script calls to `phone_number`.
    pub async fn script(&self, phone_number: &str, script: CallScript) {
        self.state
            .lock()
            .await
            .scripts
            .insert(phone_number.to_string(), script);
    }

    /// Make the next `count` status queries fail with `GatewayUnavailable`.
    pub async fn fail_status_queries(&self, count: u32) {
        self.state.lock().await.status_failures = count;
    }

    /// Every originate request received, in order (including failed ones).
    pub async fn originates(&self) -> Vec<OriginateRequest> {
        self.state.lock().await.originates.clone()
    }

    pub async fn originate_count(&self) -> usize {
        self.state.lock().await.originates.len()
    }

    /// Legs accepted and not yet ended or cancelled.
    pub async fn live_legs(&self) -> usize {
        self.state.lock().await.live()
    }

    /// Highest number of simultaneously live legs observed.
    pub async fn peak_live_legs(&self) -> usize {
        self.state.lock().await.peak_live
    }

    /// Leg ids that received a cancel request.
    pub async fn cancelled_legs(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .legs
            .iter()
            .filter(|(_, l)| l.cancelled)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// The originate request that created leg `call_id`, if any.
    pub async fn request_for(&self, call_id: &str) -> Option<OriginateRequest> {
        self.state
            .lock()
            .await
            .legs
            .get(call_id)
            .map(|l| l.request.clone())
    }

    fn report_for(call_id: &str, leg: &Leg) -> CallReport {
        if leg.cancelled {
            return CallReport::new(call_id, LegState::Canceled);
        }
        if leg.script.hangs || leg.polls <= leg.script.rings {
            return CallReport::new(call_id, LegState::Ringing);
        }
        CallReport {
            call_id: call_id.to_string(),
            state: leg.script.state,
            amd: leg.script.amd,
            digit: leg.script.digit.clone(),
            transfer_answered: leg.script.transfer_answered,
            duration_seconds: leg.script.duration_seconds,
            error: None,
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockGateway {
    fn name(&self) -> &str {
        "mock-gateway"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, DialerError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl CallGateway for MockGateway {
    async fn originate(
        &self,
        request: &OriginateRequest,
    ) -> Result<OriginateResponse, DialerError> {
        let script = {
            let mut state = self.state.lock().await;
            state.originates.push(request.clone());
            state
                .scripts
                .get(&request.phone_number)
                .cloned()
                .unwrap_or_else(|| self.default_script.clone())
        };

        match &script.originate {
            Originate::Accept => {}
            Originate::Unavailable => {
                return Err(DialerError::GatewayUnavailable {
                    message: "mock gateway unavailable".to_string(),
                    source: None,
                });
            }
            Originate::Reject => {
                return Err(DialerError::InvalidEndpoint {
                    message: format!("cannot dial {}", request.phone_number),
                });
            }
            Originate::Stall(delay) => tokio::time::sleep(*delay).await,
        }

        let call_id = format!("leg-{}", uuid::Uuid::new_v4());
        let mut state = self.state.lock().await;
        state.legs.insert(
            call_id.clone(),
            Leg {
                request: request.clone(),
                script,
                polls: 0,
                ended: false,
                cancelled: false,
            },
        );
        state.peak_live = state.peak_live.max(state.live());
        Ok(OriginateResponse { call_id })
    }

    async fn get_status(&self, call_id: &str) -> Result<CallReport, DialerError> {
        let mut state = self.state.lock().await;
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(DialerError::GatewayUnavailable {
                message: "mock status query failed".to_string(),
                source: None,
            });
        }
        let leg = state
            .legs
            .get_mut(call_id)
            .ok_or_else(|| DialerError::InvalidEndpoint {
                message: format!("unknown call {call_id}"),
            })?;
        leg.polls += 1;
        let report = Self::report_for(call_id, leg);
        if report.state.is_terminal() {
            leg.ended = true;
        }
        Ok(report)
    }

    async fn cancel(&self, call_id: &str) -> Result<(), DialerError> {
        let mut state = self.state.lock().await;
        if let Some(leg) = state.legs.get_mut(call_id) {
            leg.cancelled = true;
            leg.ended = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(phone: &str) -> OriginateRequest {
        OriginateRequest {
            phone_number: phone.to_string(),
            transfer_number: "+15550000000".to_string(),
            greeting_audio_url: "https://audio.example/greeting.wav".to_string(),
            port_number: 1,
            campaign_id: "camp-1".to_string(),
            is_test: false,
        }
    }

    #[tokio::test]
    async fn default_script_rings_then_completes() {
        let gw = MockGateway::new();
        let leg = gw.originate(&request("+1555")).await.unwrap().call_id;
        assert_eq!(gw.get_status(&leg).await.unwrap().state, LegState::Ringing);
        let report = gw.get_status(&leg).await.unwrap();
        assert_eq!(report.state, LegState::Completed);
        assert_eq!(report.amd, Some(AmdResult::Human));
        assert_eq!(gw.live_legs().await, 0);
        assert_eq!(gw.peak_live_legs().await, 1);
    }

    #[tokio::test]
    async fn scripted_rejection() {
        let gw = MockGateway::new();
        gw.script("+1666", CallScript::rejected()).await;
        let err = gw.originate(&request("+1666")).await.unwrap_err();
        assert!(matches!(err, DialerError::InvalidEndpoint { .. }));
        assert_eq!(gw.originate_count().await, 1);
    }

    #[tokio::test]
    async fn cancel_ends_a_hanging_leg() {
        let gw = MockGateway::with_default(CallScript::hangs());
        let leg = gw.originate(&request("+1777")).await.unwrap().call_id;
        for _ in 0..5 {
            assert_eq!(gw.get_status(&leg).await.unwrap().state, LegState::Ringing);
        }
        gw.cancel(&leg).await.unwrap();
        assert_eq!(gw.get_status(&leg).await.unwrap().state, LegState::Canceled);
        assert_eq!(gw.cancelled_legs().await, vec![leg]);
    }

    #[tokio::test]
    async fn injected_status_failures_are_consumed() {
        let gw = MockGateway::new();
        let leg = gw.originate(&request("+1888")).await.unwrap().call_id;
        gw.fail_status_queries(1).await;
        assert!(gw.get_status(&leg).await.is_err());
        assert!(gw.get_status(&leg).await.is_ok());
    }
}
