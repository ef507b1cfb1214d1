// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaigns and contact lists.
//!
//! These tables belong to the surrounding product. The dialer reads them and
//! writes only the `campaigns.status` mirror; the insert helpers exist for
//! seeding and tests.

use ringpost_core::types::now_timestamp;
use ringpost_core::{CampaignRecord, CampaignStatus, Contact, DialerError};
use rusqlite::{OptionalExtension, params};

use super::parse_column;
use crate::database::{Database, map_tr_err};

/// Fetch a campaign by id.
pub async fn get_campaign(db: &Database, id: &str) -> Result<Option<CampaignRecord>, DialerError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, owner_id, contact_list_id, transfer_number, greeting_audio_url, \
                 status, dial_timeout_secs FROM campaigns WHERE id = ?1",
                params![id],
                |row| {
                    let status: String = row.get(5)?;
                    let dial_timeout_secs: Option<i64> = row.get(6)?;
                    Ok(CampaignRecord {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        contact_list_id: row.get(2)?,
                        transfer_number: row.get(3)?,
                        greeting_audio_url: row.get(4)?,
                        status: parse_column(5, &status)?,
                        dial_timeout_secs: dial_timeout_secs.and_then(|s| u64::try_from(s).ok()),
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Contacts of a list in dialing order.
pub async fn list_contacts(
    db: &Database,
    contact_list_id: &str,
) -> Result<Vec<Contact>, DialerError> {
    let contact_list_id = contact_list_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT position, phone_number FROM contacts \
                 WHERE contact_list_id = ?1 ORDER BY position ASC",
            )?;
            let rows = stmt
                .query_map(params![contact_list_id], |row| {
                    Ok(Contact {
                        position: row.get(0)?,
                        phone_number: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Write the campaign status mirror.
pub async fn set_campaign_status(
    db: &Database,
    id: &str,
    status: CampaignStatus,
) -> Result<(), DialerError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE campaigns SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.to_string(), now_timestamp()],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a campaign.
pub async fn upsert_campaign(db: &Database, campaign: &CampaignRecord) -> Result<(), DialerError> {
    let campaign = campaign.clone();
    db.connection()
        .call(move |conn| {
            let dial_timeout_secs = campaign
                .dial_timeout_secs
                .map(|s| i64::try_from(s).unwrap_or(i64::MAX));
            conn.execute(
                "INSERT INTO campaigns (id, owner_id, contact_list_id, transfer_number, \
                 greeting_audio_url, status, dial_timeout_secs) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT (id) DO UPDATE SET owner_id = excluded.owner_id, \
                 contact_list_id = excluded.contact_list_id, \
                 transfer_number = excluded.transfer_number, \
                 greeting_audio_url = excluded.greeting_audio_url, \
                 status = excluded.status, dial_timeout_secs = excluded.dial_timeout_secs, \
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    campaign.id,
                    campaign.owner_id,
                    campaign.contact_list_id,
                    campaign.transfer_number,
                    campaign.greeting_audio_url,
                    campaign.status.to_string(),
                    dial_timeout_secs,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace the contents of a contact list.
pub async fn replace_contacts(
    db: &Database,
    contact_list_id: &str,
    contacts: &[Contact],
) -> Result<(), DialerError> {
    let contact_list_id = contact_list_id.to_string();
    let contacts = contacts.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM contacts WHERE contact_list_id = ?1",
                params![contact_list_id],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO contacts (contact_list_id, position, phone_number) VALUES (?1, ?2, ?3)",
                )?;
                for contact in &contacts {
                    stmt.execute(params![contact_list_id, contact.position, contact.phone_number])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
