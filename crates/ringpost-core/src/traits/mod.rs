// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the collaborators the engine consumes.
//!
//! Async adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod classifier;
pub mod directory;
pub mod gateway;

pub use adapter::PluginAdapter;
pub use classifier::OutcomeClassifier;
pub use directory::CampaignDirectory;
pub use gateway::CallGateway;
