// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Ringpost campaign dialer.

use thiserror::Error;

use crate::types::{JobStatus, PortStatus};

/// The primary error type used across all Ringpost adapters and engine operations.
///
/// Every variant maps to a stable [`code`](DialerError::code) that is safe to
/// persist and to return to API callers, and to a generic
/// [`user_message`](DialerError::user_message) for presentation surfaces.
#[derive(Debug, Error)]
pub enum DialerError {
    /// The owner has no port with this number.
    #[error("port {port_number} not found for owner {owner_id}")]
    PortNotFound { owner_id: String, port_number: u32 },

    /// The port is not available (lost an allocation race, or in error/offline).
    #[error("port {port_number} is {status}, not available")]
    PortUnavailable { port_number: u32, status: PortStatus },

    /// No (or not enough) ports are free to proceed.
    #[error("insufficient capacity: requested {requested} port(s), {available} available")]
    InsufficientCapacity { requested: usize, available: usize },

    /// The telephony control plane could not be reached or rejected the request transiently.
    #[error("call gateway unavailable: {message}")]
    GatewayUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The telephony control plane rejected the destination or request as invalid.
    #[error("invalid endpoint: {message}")]
    InvalidEndpoint { message: String },

    /// A port stayed busy past the plausible call duration with no unresolved attempt.
    #[error("port {port_number} stale busy since {busy_since} (call {call_id:?})")]
    StaleBusyPort {
        port_number: u32,
        call_id: Option<String>,
        busy_since: String,
    },

    /// Requested entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Requested entity belongs to a different owner.
    #[error("{entity} {id} is not owned by the caller")]
    NotOwner { entity: &'static str, id: String },

    /// A non-terminal job already exists for the campaign.
    #[error("campaign {campaign_id} already has an active job {job_id}")]
    AlreadyRunning { campaign_id: String, job_id: String },

    /// A job status change that the state machine forbids.
    #[error("invalid job transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DialerError {
    /// Stable machine-readable classification code.
    pub fn code(&self) -> &'static str {
        match self {
            DialerError::PortNotFound { .. } => "port_not_found",
            DialerError::PortUnavailable { .. } => "port_unavailable",
            DialerError::InsufficientCapacity { .. } => "insufficient_capacity",
            DialerError::GatewayUnavailable { .. } => "gateway_unavailable",
            DialerError::InvalidEndpoint { .. } => "invalid_endpoint",
            DialerError::StaleBusyPort { .. } => "stale_busy_port",
            DialerError::NotFound { .. } => "not_found",
            DialerError::NotOwner { .. } => "not_owner",
            DialerError::AlreadyRunning { .. } => "already_running",
            DialerError::InvalidTransition { .. } => "invalid_transition",
            DialerError::Storage { .. } => "storage",
            DialerError::Config(_) => "config",
            DialerError::Timeout { .. } => "timeout",
            DialerError::Internal(_) => "internal",
        }
    }

    /// Generic human-readable message suitable for end users.
    ///
    /// Never includes identifiers, hosts, or backend details.
    pub fn user_message(&self) -> &'static str {
        match self {
            DialerError::PortNotFound { .. } => "That port does not exist.",
            DialerError::PortUnavailable { .. } => "That port is currently in use.",
            DialerError::InsufficientCapacity { .. } => {
                "No phone lines are free right now. Try again shortly."
            }
            DialerError::GatewayUnavailable { .. } | DialerError::Timeout { .. } => {
                "The phone system is not responding. Try again shortly."
            }
            DialerError::InvalidEndpoint { .. } => "The phone number could not be dialed.",
            DialerError::NotFound { .. } | DialerError::NotOwner { .. } => {
                "The requested item was not found."
            }
            DialerError::AlreadyRunning { .. } => "This campaign is already running.",
            DialerError::InvalidTransition { .. } => {
                "That action is not possible in the job's current state."
            }
            DialerError::StaleBusyPort { .. }
            | DialerError::Storage { .. }
            | DialerError::Config(_)
            | DialerError::Internal(_) => "Something went wrong. Please try again.",
        }
    }

    /// Wraps any storage-layer error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DialerError::Storage {
            source: Box::new(err),
        }
    }
}
