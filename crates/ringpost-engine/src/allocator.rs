// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Port reservation policy on top of [`PortRegistry`]'s atomic transitions.

use ringpost_core::{DialerError, PortReservation, PortStatus};
use tracing::{debug, warn};

use crate::registry::PortRegistry;

/// Hands out ports for call attempts.
///
/// A reservation lives for exactly one call attempt: the holder must release
/// it (through [`PortRegistry::release_call`]) when the attempt resolves.
#[derive(Clone)]
pub struct PortAllocator {
    registry: PortRegistry,
}

impl PortAllocator {
    pub fn new(registry: PortRegistry) -> Self {
        Self { registry }
    }

    /// Reserve up to `count` ports for `campaign_id`.
    ///
    /// Walks the owner's ports least-recently-used first and tries each
    /// available one once with a fresh call id. A port lost to a concurrent
    /// caller is skipped, not retried. Returning fewer than `count` (even zero)
    /// is not an error.
    pub async fn reserve(
        &self,
        owner_id: &str,
        count: usize,
        campaign_id: &str,
    ) -> Result<Vec<PortReservation>, DialerError> {
        let mut reserved = Vec::with_capacity(count);
        if count == 0 {
            return Ok(reserved);
        }

        let candidates = self.registry.list_ports(owner_id).await?;
        for port in candidates
            .into_iter()
            .filter(|p| p.status == PortStatus::Available)
        {
            if reserved.len() == count {
                break;
            }
            let call_id = uuid::Uuid::new_v4().to_string();
            match self
                .registry
                .mark_busy(owner_id, port.port_number, campaign_id, &call_id)
                .await
            {
                Ok(()) => reserved.push(PortReservation {
                    owner_id: owner_id.to_string(),
                    port_number: port.port_number,
                    campaign_id: campaign_id.to_string(),
                    call_id,
                }),
                Err(DialerError::PortUnavailable { .. } | DialerError::PortNotFound { .. }) => {
                    continue;
                }
                Err(e) => {
                    // Give back what we already hold before bailing out.
                    self.release_all(&reserved).await;
                    return Err(e);
                }
            }
        }

        debug!(
            owner_id,
            campaign_id,
            requested = count,
            reserved = reserved.len(),
            "ports reserved"
        );
        Ok(reserved)
    }

    /// Reserve exactly `count` ports or none at all.
    ///
    /// Fails with `InsufficientCapacity` when fewer than `count` are free.
    pub async fn reserve_exact(
        &self,
        owner_id: &str,
        count: usize,
        campaign_id: &str,
    ) -> Result<Vec<PortReservation>, DialerError> {
        let reserved = self.reserve(owner_id, count, campaign_id).await?;
        if reserved.len() < count {
            let available = reserved.len();
            self.release_all(&reserved).await;
            return Err(DialerError::InsufficientCapacity {
                requested: count,
                available,
            });
        }
        Ok(reserved)
    }

    async fn release_all(&self, reservations: &[PortReservation]) {
        for r in reservations {
            if let Err(e) = self
                .registry
                .release_call(&r.owner_id, r.port_number, &r.call_id, None)
                .await
            {
                warn!(port_number = r.port_number, error = %e, "failed to return reserved port");
            }
        }
    }
}
