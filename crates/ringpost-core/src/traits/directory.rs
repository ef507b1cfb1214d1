// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read access to campaigns and contact lists owned by other subsystems.

use async_trait::async_trait;

use crate::error::DialerError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{CampaignRecord, CampaignStatus, Contact};

/// Adapter over the campaign and contact-list store.
///
/// The dialer never edits campaigns; the only write is the status mirror
/// that reflects the job's lifecycle back onto the campaign.
#[async_trait]
pub trait CampaignDirectory: PluginAdapter {
    /// Looks up a campaign by id.
    async fn campaign(&self, campaign_id: &str) -> Result<Option<CampaignRecord>, DialerError>;

    /// Returns a contact list in dialing order.
    async fn contacts(&self, contact_list_id: &str) -> Result<Vec<Contact>, DialerError>;

    /// Mirrors the job's lifecycle onto the campaign's status.
    async fn mirror_status(
        &self,
        campaign_id: &str,
        status: CampaignStatus,
    ) -> Result<(), DialerError>;
}
