// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the dialer: ports, jobs, call attempts,
//! campaigns, and the call gateway wire types.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Format used for every persisted timestamp (UTC, millisecond precision).
///
/// Matches SQLite's `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` so values written
/// from Rust and from SQL compare lexicographically.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// UTC time `secs` seconds ago in [`TIMESTAMP_FORMAT`].
pub fn timestamp_secs_ago(secs: u64) -> String {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
    chrono::Utc::now()
        .checked_sub_signed(chrono::Duration::seconds(secs))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter plugged into the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Gateway,
    Classifier,
    Directory,
}

// --- Ports ---

/// Lifecycle state of a physical telephony port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PortStatus {
    Available,
    Busy,
    Error,
    Offline,
}

/// An addressable channel on a gateway device; carries one call at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub owner_id: String,
    pub port_number: u32,
    pub device_label: String,
    pub status: PortStatus,
    pub current_campaign_id: Option<String>,
    pub current_call_id: Option<String>,
    pub last_used_at: Option<String>,
    pub error_info: Option<String>,
}

/// Kind of a port audit record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PortEventKind {
    Allocation,
    Release,
    Error,
    Reset,
    WatchdogRelease,
}

/// One entry of the port allocation audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortEvent {
    pub id: i64,
    pub owner_id: String,
    pub port_number: u32,
    pub kind: PortEventKind,
    pub campaign_id: Option<String>,
    pub call_id: Option<String>,
    pub call_status: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub created_at: String,
}

/// A port handed out by the allocator for exactly one call attempt.
///
/// `call_id` is minted at reservation time and written onto the port; the
/// call attempt created for this reservation uses it as its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortReservation {
    pub owner_id: String,
    pub port_number: u32,
    pub campaign_id: String,
    pub call_id: String,
}

// --- Jobs ---

/// Status of a dialer job.
///
/// `pending -> starting -> running -> {paused, completed, cancelled, failed}`,
/// `paused -> running`. Completed, cancelled and failed are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Starting,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl JobStatus {
    /// Non-terminal statuses, in the order they are usually reached.
    pub const ACTIVE: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Starting,
        JobStatus::Running,
        JobStatus::Paused,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// Whether the dispatch loop may place new calls in this status.
    pub fn is_dispatching(self) -> bool {
        matches!(self, JobStatus::Starting | JobStatus::Running)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Starting, Running)
                | (Starting, Completed)
                | (Starting, Cancelled)
                | (Starting, Failed)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Cancelled)
                | (Running, Failed)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (Paused, Failed)
        )
    }

    /// The campaign status mirrored while the job is in this status.
    pub fn campaign_status(self) -> CampaignStatus {
        match self {
            JobStatus::Pending | JobStatus::Starting | JobStatus::Running => {
                CampaignStatus::Active
            }
            JobStatus::Paused => CampaignStatus::Paused,
            JobStatus::Completed => CampaignStatus::Completed,
            JobStatus::Cancelled => CampaignStatus::Cancelled,
            JobStatus::Failed => CampaignStatus::Failed,
        }
    }
}

/// Runtime execution instance of a campaign's dialing process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialerJob {
    pub id: String,
    pub campaign_id: String,
    pub owner_id: String,
    pub status: JobStatus,
    pub total_calls: u32,
    pub completed_calls: u32,
    pub successful_calls: u32,
    pub failed_calls: u32,
    pub max_concurrent_calls: u32,
    pub created_at: String,
    pub updated_at: String,
    pub ended_at: Option<String>,
}

impl DialerJob {
    /// Whether the counter invariants hold for this snapshot.
    pub fn counters_consistent(&self) -> bool {
        self.completed_calls <= self.total_calls
            && self.successful_calls + self.failed_calls <= self.completed_calls
    }
}

// --- Call attempts ---

/// Persisted status of one call attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CallStatus {
    Initiated,
    Ringing,
    Answered,
    Voicemail,
    Transferred,
    NoAnswer,
    Failed,
}

/// Canonical outcome of a resolved call attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Transferred,
    AnsweredNoTransfer,
    Voicemail,
    NoAnswer,
    GatewayFailure,
}

impl CallOutcome {
    /// Whether the outcome counts as a reached contact in job statistics.
    pub fn is_success(self) -> bool {
        matches!(
            self,
            CallOutcome::Transferred | CallOutcome::AnsweredNoTransfer
        )
    }

    /// Persisted attempt status for this outcome.
    pub fn call_status(self) -> CallStatus {
        match self {
            CallOutcome::Transferred => CallStatus::Transferred,
            CallOutcome::AnsweredNoTransfer => CallStatus::Answered,
            CallOutcome::Voicemail => CallStatus::Voicemail,
            CallOutcome::NoAnswer => CallStatus::NoAnswer,
            CallOutcome::GatewayFailure => CallStatus::Failed,
        }
    }
}

/// The classifier's verdict for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub outcome: CallOutcome,
    pub transfer_requested: bool,
    pub transfer_successful: bool,
    pub duration_seconds: u32,
    pub notes: Option<String>,
}

impl Classification {
    /// A gateway failure with an explanatory note.
    pub fn gateway_failure(notes: impl Into<String>) -> Self {
        Self {
            outcome: CallOutcome::GatewayFailure,
            transfer_requested: false,
            transfer_successful: false,
            duration_seconds: 0,
            notes: Some(notes.into()),
        }
    }
}

/// One placed-and-resolved call record belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAttempt {
    pub id: String,
    pub job_id: String,
    pub port_number: u32,
    pub phone_number: String,
    pub gateway_call_id: Option<String>,
    pub status: CallStatus,
    pub outcome: Option<CallOutcome>,
    pub transfer_requested: bool,
    pub transfer_successful: bool,
    pub duration_seconds: u32,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub notes: Option<String>,
}

impl CallAttempt {
    pub fn is_resolved(&self) -> bool {
        self.ended_at.is_some()
    }
}

// --- Campaigns ---

/// Campaign status, a state machine separate from the job's.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

/// Owner-defined batch pairing a contact list with a greeting and transfer destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: String,
    pub owner_id: String,
    pub contact_list_id: String,
    pub transfer_number: String,
    pub greeting_audio_url: String,
    pub status: CampaignStatus,
    /// Per-campaign dial-timeout ceiling; falls back to the dialer default.
    pub dial_timeout_secs: Option<u64>,
}

/// A phone number on a contact list, in dialing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub position: i64,
    pub phone_number: String,
}

// --- Call gateway wire types ---

/// Request to place one outbound call on a specific port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginateRequest {
    pub phone_number: String,
    pub transfer_number: String,
    pub greeting_audio_url: String,
    pub port_number: u32,
    pub campaign_id: String,
    pub is_test: bool,
}

/// Gateway acknowledgement of an accepted call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginateResponse {
    pub call_id: String,
}

/// State of the outbound leg as reported by the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    Queued,
    Ringing,
    InProgress,
    Completed,
    NoAnswer,
    Busy,
    Failed,
    Canceled,
}

impl LegState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LegState::Completed
                | LegState::NoAnswer
                | LegState::Busy
                | LegState::Failed
                | LegState::Canceled
        )
    }
}

/// Answering-machine detection verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AmdResult {
    Human,
    Machine,
    Unknown,
}

/// Snapshot of a call as returned by the gateway's status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReport {
    pub call_id: String,
    pub state: LegState,
    #[serde(default)]
    pub amd: Option<AmdResult>,
    /// The single DTMF digit captured after the greeting, if any.
    #[serde(default)]
    pub digit: Option<String>,
    /// Whether the bridged transfer leg was answered.
    #[serde(default)]
    pub transfer_answered: bool,
    #[serde(default)]
    pub duration_seconds: u32,
    #[serde(default)]
    pub error: Option<String>,
}

impl CallReport {
    /// A report in the given state with no signals attached.
    pub fn new(call_id: impl Into<String>, state: LegState) -> Self {
        Self {
            call_id: call_id.into(),
            state,
            amd: None,
            digit: None,
            transfer_answered: false,
            duration_seconds: 0,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn call_status_uses_kebab_case() {
        assert_eq!(CallStatus::NoAnswer.to_string(), "no-answer");
        assert_eq!(
            CallStatus::from_str("no-answer").unwrap(),
            CallStatus::NoAnswer
        );
    }

    #[test]
    fn terminal_statuses_have_no_exits() {
        let all = [
            JobStatus::Pending,
            JobStatus::Starting,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Failed,
        ];
        for from in all.iter().filter(|s| s.is_terminal()) {
            for to in &all {
                assert!(!from.can_transition_to(*to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn pause_resume_cycle_is_allowed() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Paused));
        assert!(JobStatus::Paused.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Paused.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Pending.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn campaign_mirror_mapping() {
        assert_eq!(JobStatus::Running.campaign_status(), CampaignStatus::Active);
        assert_eq!(JobStatus::Paused.campaign_status(), CampaignStatus::Paused);
        assert_eq!(
            JobStatus::Cancelled.campaign_status(),
            CampaignStatus::Cancelled
        );
        assert_eq!(JobStatus::Failed.campaign_status(), CampaignStatus::Failed);
    }

    #[test]
    fn success_outcomes() {
        assert!(CallOutcome::Transferred.is_success());
        assert!(CallOutcome::AnsweredNoTransfer.is_success());
        assert!(!CallOutcome::Voicemail.is_success());
        assert!(!CallOutcome::NoAnswer.is_success());
        assert!(!CallOutcome::GatewayFailure.is_success());
    }

    #[test]
    fn call_report_deserializes_with_missing_signals() {
        let report: CallReport =
            serde_json::from_str(r#"{"call_id":"c1","state":"in_progress"}"#).unwrap();
        assert_eq!(report.state, LegState::InProgress);
        assert!(report.amd.is_none());
        assert!(!report.transfer_answered);
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let earlier = timestamp_secs_ago(60);
        let now = now_timestamp();
        assert!(earlier < now);
        assert_eq!(now.len(), "2026-01-01T00:00:00.000Z".len());
    }
}
