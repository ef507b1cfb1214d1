// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborators shared by every dispatch loop, the orchestrator and test calls.

use std::sync::Arc;
use std::time::Duration;

use ringpost_config::model::DialerConfig;
use ringpost_core::{CallGateway, CampaignDirectory, CampaignRecord, OutcomeClassifier};
use ringpost_storage::Database;

use crate::allocator::PortAllocator;
use crate::registry::PortRegistry;

pub struct DialerContext {
    pub db: Database,
    pub registry: PortRegistry,
    pub allocator: PortAllocator,
    pub gateway: Arc<dyn CallGateway>,
    pub classifier: Arc<dyn OutcomeClassifier>,
    pub directory: Arc<dyn CampaignDirectory>,
    pub config: DialerConfig,
}

impl DialerContext {
    pub fn new(
        db: Database,
        gateway: Arc<dyn CallGateway>,
        classifier: Arc<dyn OutcomeClassifier>,
        directory: Arc<dyn CampaignDirectory>,
        config: DialerConfig,
    ) -> Self {
        let registry = PortRegistry::new(db.clone());
        let allocator = PortAllocator::new(registry.clone());
        Self {
            db,
            registry,
            allocator,
            gateway,
            classifier,
            directory,
            config,
        }
    }

    /// Dial-timeout ceiling for a campaign: its override, else the configured default.
    pub fn dial_timeout(&self, campaign: &CampaignRecord) -> Duration {
        Duration::from_secs(
            campaign
                .dial_timeout_secs
                .unwrap_or(self.config.dial_timeout_secs),
        )
    }
}
