// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign dialing engine for Ringpost.
//!
//! The [`CampaignOrchestrator`] owns each job's lifecycle and runs one
//! dispatch loop per active job. Loops take ports through the
//! [`PortAllocator`], place calls via a [`CallGateway`](ringpost_core::CallGateway),
//! poll the gateway for outcomes and classify them with an
//! [`OutcomeClassifier`](ringpost_core::OutcomeClassifier). The
//! [`PortWatchdog`] returns ports stranded by crashes to the pool.

pub mod allocator;
pub mod classifier;
pub mod context;
mod dispatch;
pub mod orchestrator;
pub mod recording;
pub mod registry;
pub mod shutdown;
pub mod test_call;
pub mod watchdog;

pub use allocator::PortAllocator;
pub use classifier::AmdOutcomeClassifier;
pub use context::DialerContext;
pub use orchestrator::CampaignOrchestrator;
pub use registry::PortRegistry;
pub use test_call::TestCall;
pub use watchdog::PortWatchdog;
