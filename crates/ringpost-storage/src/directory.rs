// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the CampaignDirectory trait.

use async_trait::async_trait;
use tracing::debug;

use ringpost_core::{
    AdapterType, CampaignDirectory, CampaignRecord, CampaignStatus, Contact, DialerError,
    HealthStatus, PluginAdapter,
};

use crate::database::Database;
use crate::queries;

/// Campaign directory backed by the local `campaigns` and `contacts` tables.
pub struct SqliteCampaignDirectory {
    db: Database,
}

impl SqliteCampaignDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PluginAdapter for SqliteCampaignDirectory {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Directory
    }

    async fn health_check(&self) -> Result<HealthStatus, DialerError> {
        self.db
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl CampaignDirectory for SqliteCampaignDirectory {
    async fn campaign(&self, campaign_id: &str) -> Result<Option<CampaignRecord>, DialerError> {
        queries::campaigns::get_campaign(&self.db, campaign_id).await
    }

    async fn contacts(&self, contact_list_id: &str) -> Result<Vec<Contact>, DialerError> {
        queries::campaigns::list_contacts(&self.db, contact_list_id).await
    }

    async fn mirror_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), DialerError> {
        queries::campaigns::set_campaign_status(&self.db, campaign_id, status).await?;
        debug!(campaign_id, %status, "campaign status mirrored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let db = Database::open_in_memory().await.unwrap();
        let directory = SqliteCampaignDirectory::new(db);
        assert_eq!(directory.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(directory.adapter_type(), AdapterType::Directory);
    }

    #[tokio::test]
    async fn mirror_status_writes_through() {
        let db = Database::open_in_memory().await.unwrap();
        queries::campaigns::upsert_campaign(
            &db,
            &CampaignRecord {
                id: "camp-1".into(),
                owner_id: "owner-1".into(),
                contact_list_id: "list-1".into(),
                transfer_number: "+15550000000".into(),
                greeting_audio_url: "https://cdn.example.com/g.wav".into(),
                status: CampaignStatus::Draft,
                dial_timeout_secs: None,
            },
        )
        .await
        .unwrap();

        let directory = SqliteCampaignDirectory::new(db);
        directory
            .mirror_status("camp-1", CampaignStatus::Paused)
            .await
            .unwrap();
        let campaign = directory.campaign("camp-1").await.unwrap().unwrap();
        assert_eq!(campaign.status, CampaignStatus::Paused);
    }
}
