// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authenticated HTTP job-control surface for Ringpost.
//!
//! Exposes job start/cancel/pause/resume/status, attempt reports, port
//! listing and reset, and test calls. Bearer tokens map to owner ids; every
//! operation is scoped to the calling owner.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::{AuthConfig, Owner};
pub use error::{ApiError, ErrorResponse};
pub use server::{ApiState, HealthState, ServerConfig, router, start_server};
