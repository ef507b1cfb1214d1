// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single out-of-job test calls.
//!
//! A test call takes one port through the same allocation path as a job, but
//! has no attempt row. Its port is released after a fixed ceiling whether or
//! not the gateway reports the call as ended.

use std::sync::Arc;

use ringpost_core::types::OriginateRequest;
use ringpost_core::{CampaignRecord, DialerError};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::DialerContext;
use crate::dispatch;
use crate::recording;

/// A placed test call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCall {
    /// Internal id holding the port.
    pub call_id: String,
    pub port_number: u32,
    /// Leg id assigned by the gateway.
    pub gateway_call_id: String,
}

pub(crate) async fn place(
    ctx: &Arc<DialerContext>,
    campaign: &CampaignRecord,
    phone_number: &str,
    shutdown: CancellationToken,
) -> Result<TestCall, DialerError> {
    if phone_number.trim().is_empty() {
        return Err(DialerError::InvalidEndpoint {
            message: "phone number is empty".to_string(),
        });
    }

    let mut reserved = ctx
        .allocator
        .reserve_exact(&campaign.owner_id, 1, &campaign.id)
        .await?;
    let reservation = reserved
        .pop()
        .ok_or_else(|| DialerError::Internal("reservation vanished".to_string()))?;

    let request = OriginateRequest {
        phone_number: phone_number.to_string(),
        transfer_number: campaign.transfer_number.clone(),
        greeting_audio_url: campaign.greeting_audio_url.clone(),
        port_number: reservation.port_number,
        campaign_id: campaign.id.clone(),
        is_test: true,
    };
    let timeout = ctx.config.originate_timeout();
    let response = match tokio::time::timeout(timeout, ctx.gateway.originate(&request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            dispatch::release_reservations(ctx, std::slice::from_ref(&reservation)).await;
            return Err(e);
        }
        Err(_) => {
            dispatch::release_reservations(ctx, std::slice::from_ref(&reservation)).await;
            return Err(DialerError::Timeout { duration: timeout });
        }
    };

    recording::record_call_placed(true);
    info!(
        campaign_id = %campaign.id,
        port_number = reservation.port_number,
        call_id = %reservation.call_id,
        gateway_call_id = %response.call_id,
        "test call placed"
    );

    let ceiling = ctx.config.test_call_ceiling();
    let task_ctx = ctx.clone();
    let leg = response.call_id.clone();
    let held = reservation.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(ceiling) => {
                dispatch::cancel_leg(&task_ctx, &leg).await;
            }
            // On shutdown the port stays busy; the watchdog reclaims it after restart.
            _ = shutdown.cancelled() => return,
        }
        match task_ctx
            .registry
            .release_call(&held.owner_id, held.port_number, &held.call_id, None)
            .await
        {
            Ok(_) => info!(port_number = held.port_number, call_id = %held.call_id, "test call port released"),
            Err(e) => warn!(port_number = held.port_number, error = %e, "failed to release test call port"),
        }
    });

    Ok(TestCall {
        call_id: reservation.call_id,
        port_number: reservation.port_number,
        gateway_call_id: response.call_id,
    })
}
