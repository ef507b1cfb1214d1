// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Ringpost campaign dialer.
//!
//! This crate provides the error taxonomy, the domain types (ports, jobs,
//! call attempts, campaigns) and the adapter traits the engine consumes.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::DialerError;
pub use types::{
    AdapterType, CallAttempt, CallOutcome, CallReport, CallStatus, CampaignRecord,
    CampaignStatus, Classification, Contact, DialerJob, HealthStatus, JobStatus, Port,
    PortEvent, PortEventKind, PortReservation, PortStatus,
};

pub use traits::{CallGateway, CampaignDirectory, OutcomeClassifier, PluginAdapter};
