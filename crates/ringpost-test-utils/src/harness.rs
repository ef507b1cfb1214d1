// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete dialer stack with a mock gateway, a
//! temp SQLite database and the SQLite campaign directory. Dialer timings
//! default to values small enough for jobs to finish in well under a second.

use std::sync::Arc;
use std::time::Duration;

use ringpost_config::model::{DialerConfig, StorageConfig};
use ringpost_core::types::{CampaignStatus, Contact, PortStatus};
use ringpost_core::{CampaignRecord, DialerError, DialerJob};
use ringpost_engine::{AmdOutcomeClassifier, CampaignOrchestrator, DialerContext, PortRegistry};
use ringpost_storage::queries::campaigns;
use ringpost_storage::{Database, SqliteCampaignDirectory};

use crate::mock_gateway::MockGateway;

/// Owner used by harness fixtures unless stated otherwise.
pub const OWNER: &str = "owner-1";

/// Dialer timings tuned for tests.
pub fn fast_dialer_config() -> DialerConfig {
    DialerConfig {
        poll_interval_ms: 20,
        originate_timeout_secs: 2,
        gateway_query_timeout_secs: 1,
        dial_timeout_secs: 30,
        capacity_grace_secs: 1,
        test_call_ceiling_secs: 1,
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    ports: u32,
    gateway: MockGateway,
    dialer: DialerConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            ports: 2,
            gateway: MockGateway::new(),
            dialer: fast_dialer_config(),
        }
    }

    /// Number of ports registered for [`OWNER`], numbered from 1.
    pub fn with_ports(mut self, ports: u32) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_gateway(mut self, gateway: MockGateway) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_dialer_config(mut self, dialer: DialerConfig) -> Self {
        self.dialer = dialer;
        self
    }

    /// Build the harness, creating the database and registering ports.
    pub async fn build(self) -> Result<TestHarness, DialerError> {
        let temp_dir = tempfile::TempDir::new().map_err(DialerError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::from_config(&StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        })
        .await?;

        let gateway = Arc::new(self.gateway);
        let ctx = Arc::new(DialerContext::new(
            db.clone(),
            gateway.clone(),
            Arc::new(AmdOutcomeClassifier),
            Arc::new(SqliteCampaignDirectory::new(db.clone())),
            self.dialer,
        ));
        for n in 1..=self.ports {
            ctx.registry
                .register_port(OWNER, n, &format!("gsm-{n}"))
                .await?;
        }
        let orchestrator = CampaignOrchestrator::new(ctx);

        Ok(TestHarness {
            db,
            gateway,
            orchestrator,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete dialer environment with a mock gateway and temp storage.
pub struct TestHarness {
    /// Temp database (cleaned up on drop).
    pub db: Database,
    pub gateway: Arc<MockGateway>,
    pub orchestrator: CampaignOrchestrator,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn registry(&self) -> &PortRegistry {
        self.orchestrator.registry()
    }

    /// Create a draft campaign for `owner_id` dialing `numbers` in order.
    pub async fn seed_campaign(
        &self,
        campaign_id: &str,
        owner_id: &str,
        numbers: &[&str],
    ) -> Result<CampaignRecord, DialerError> {
        let campaign = CampaignRecord {
            id: campaign_id.to_string(),
            owner_id: owner_id.to_string(),
            contact_list_id: format!("{campaign_id}-contacts"),
            transfer_number: "+15550001111".to_string(),
            greeting_audio_url: format!("https://audio.example/{campaign_id}.wav"),
            status: CampaignStatus::Draft,
            dial_timeout_secs: None,
        };
        campaigns::upsert_campaign(&self.db, &campaign).await?;
        let contacts: Vec<Contact> = numbers
            .iter()
            .enumerate()
            .map(|(i, n)| Contact {
                position: i as i64,
                phone_number: n.to_string(),
            })
            .collect();
        campaigns::replace_contacts(&self.db, &campaign.contact_list_id, &contacts).await?;
        Ok(campaign)
    }

    pub async fn campaign(&self, campaign_id: &str) -> Result<Option<CampaignRecord>, DialerError> {
        campaigns::get_campaign(&self.db, campaign_id).await
    }

    /// Number of [`OWNER`]'s ports currently busy.
    pub async fn busy_ports(&self) -> Result<usize, DialerError> {
        Ok(self
            .registry()
            .list_ports(OWNER)
            .await?
            .iter()
            .filter(|p| p.status == PortStatus::Busy)
            .count())
    }

    /// Poll the job until it is terminal or `timeout` elapses.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<DialerJob, DialerError> {
        self.wait_for_job(job_id, timeout, |j| j.status.is_terminal())
            .await
    }

    /// Poll the job until `predicate` holds or `timeout` elapses.
    ///
    /// Fails with `DialerError::Timeout` carrying the last observed state in the log.
    pub async fn wait_for_job(
        &self,
        job_id: &str,
        timeout: Duration,
        predicate: impl Fn(&DialerJob) -> bool,
    ) -> Result<DialerJob, DialerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.orchestrator.status(job_id, OWNER).await?;
            if predicate(&job) {
                return Ok(job);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(?job, "job did not reach the expected state");
                return Err(DialerError::Timeout { duration: timeout });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
