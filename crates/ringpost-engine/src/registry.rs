// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single source of truth for port state.
//!
//! [`PortRegistry`] is the only component that writes `ports.status`. Every
//! transition is a conditional update in storage; there is no in-memory cache
//! to drift from the database.

use ringpost_core::{CallStatus, DialerError, Port, PortEvent};
use ringpost_storage::Database;
use ringpost_storage::queries::ports;
use tracing::{debug, info, warn};

use crate::recording;

#[derive(Clone)]
pub struct PortRegistry {
    db: Database,
}

impl PortRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Register a device port (or relabel an existing one).
    pub async fn register_port(
        &self,
        owner_id: &str,
        port_number: u32,
        device_label: &str,
    ) -> Result<Port, DialerError> {
        let port = ports::register_port(&self.db, owner_id, port_number, device_label).await?;
        info!(owner_id, port_number, device_label, "port registered");
        Ok(port)
    }

    /// Remove a port that is not carrying a call.
    pub async fn deregister_port(&self, owner_id: &str, port_number: u32) -> Result<(), DialerError> {
        ports::deregister_port(&self.db, owner_id, port_number).await?;
        info!(owner_id, port_number, "port deregistered");
        Ok(())
    }

    /// Ports least-recently-used first, ties by ascending port number.
    pub async fn list_ports(&self, owner_id: &str) -> Result<Vec<Port>, DialerError> {
        ports::list_ports(&self.db, owner_id).await
    }

    pub async fn count_available(&self, owner_id: &str) -> Result<usize, DialerError> {
        ports::count_available(&self.db, owner_id).await
    }

    /// Atomically claim an available port for `call_id`.
    pub async fn mark_busy(
        &self,
        owner_id: &str,
        port_number: u32,
        campaign_id: &str,
        call_id: &str,
    ) -> Result<(), DialerError> {
        match ports::mark_busy(&self.db, owner_id, port_number, campaign_id, call_id).await {
            Ok(()) => {
                debug!(owner_id, port_number, campaign_id, call_id, "port allocated");
                Ok(())
            }
            Err(e @ DialerError::PortUnavailable { .. }) => {
                recording::record_allocation_race_lost();
                debug!(owner_id, port_number, error = %e, "port allocation lost");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Release whatever call holds the port. No-op when not busy.
    pub async fn release(
        &self,
        owner_id: &str,
        port_number: u32,
        call_status: Option<CallStatus>,
    ) -> Result<bool, DialerError> {
        let status = call_status.map(|s| s.to_string());
        let released = ports::release(&self.db, owner_id, port_number, status.as_deref()).await?;
        if released {
            debug!(owner_id, port_number, "port released");
        }
        Ok(released)
    }

    /// Release the port only if `call_id` still holds it.
    pub async fn release_call(
        &self,
        owner_id: &str,
        port_number: u32,
        call_id: &str,
        call_status: Option<CallStatus>,
    ) -> Result<bool, DialerError> {
        let status = call_status.map(|s| s.to_string());
        let released =
            ports::release_call(&self.db, owner_id, port_number, call_id, status.as_deref()).await?;
        if released {
            debug!(owner_id, port_number, call_id, "port released");
        } else {
            debug!(owner_id, port_number, call_id, "release skipped, port not held by call");
        }
        Ok(released)
    }

    pub async fn mark_error(
        &self,
        owner_id: &str,
        port_number: u32,
        code: &str,
        message: &str,
    ) -> Result<(), DialerError> {
        ports::mark_error(&self.db, owner_id, port_number, code, message).await?;
        warn!(owner_id, port_number, code, message, "port marked as error");
        Ok(())
    }

    /// Move every busy or error port back to available. Idempotent.
    pub async fn reset_all(&self, owner_id: &str) -> Result<usize, DialerError> {
        let count = ports::reset_all(&self.db, owner_id).await?;
        info!(owner_id, count, "ports reset");
        Ok(count)
    }

    /// Audit trail for one port, oldest first.
    pub async fn events(&self, owner_id: &str, port_number: u32) -> Result<Vec<PortEvent>, DialerError> {
        ports::events(&self.db, owner_id, port_number).await
    }

    pub(crate) async fn stale_busy_ports(&self, cutoff: &str) -> Result<Vec<Port>, DialerError> {
        ports::stale_busy_ports(&self.db, cutoff).await
    }

    pub(crate) async fn reclaim_stale(
        &self,
        owner_id: &str,
        port_number: u32,
        call_id: &str,
        cutoff: &str,
    ) -> Result<bool, DialerError> {
        ports::reclaim_stale(&self.db, owner_id, port_number, call_id, cutoff).await
    }
}
