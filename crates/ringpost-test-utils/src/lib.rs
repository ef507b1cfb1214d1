// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Ringpost integration tests.
//!
//! Provides a scripted call gateway and a harness that wires a full dialer
//! stack over a temp database, for fast, deterministic tests without a
//! telephony backend.
//!
//! # Components
//!
//! - [`MockGateway`] - Call gateway driven by per-number [`CallScript`]s
//! - [`TestHarness`] - Orchestrator, registry and database with fixtures

pub mod harness;
pub mod mock_gateway;

pub use harness::{OWNER, TestHarness, fast_dialer_config};
pub use mock_gateway::{CallScript, MockGateway, Originate};
