// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait shared by every pluggable collaborator.

use async_trait::async_trait;

use crate::error::DialerError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all Ringpost adapters.
///
/// Every adapter (call gateway, campaign directory, etc.) implements this
/// trait, which provides identity and health check capabilities.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, DialerError>;
}
