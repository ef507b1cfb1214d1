// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stale busy-port reclamation.
//!
//! A port can stay busy forever if the process died between placing a call
//! and releasing it, or if a test call's release task never ran. The
//! [`PortWatchdog`] periodically returns such ports to the pool: a port is
//! stale when it has been busy longer than `stale_after_secs` and no
//! unresolved call attempt still references it.

use std::time::Duration;

use ringpost_core::DialerError;
use ringpost_core::types::timestamp_secs_ago;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::recording;
use crate::registry::PortRegistry;

pub struct PortWatchdog {
    registry: PortRegistry,
    stale_after_secs: u64,
}

impl PortWatchdog {
    pub fn new(registry: PortRegistry, stale_after_secs: u64) -> Self {
        Self {
            registry,
            stale_after_secs,
        }
    }

    /// One reclamation pass across all owners. Returns how many ports were released.
    pub async fn sweep(&self) -> Result<usize, DialerError> {
        let cutoff = timestamp_secs_ago(self.stale_after_secs);
        let stale = self.registry.stale_busy_ports(&cutoff).await?;
        let mut reclaimed = 0;

        for port in stale {
            let Some(call_id) = port.current_call_id.clone() else {
                continue;
            };
            let finding = DialerError::StaleBusyPort {
                port_number: port.port_number,
                call_id: Some(call_id.clone()),
                busy_since: port.last_used_at.clone().unwrap_or_default(),
            };
            warn!(owner_id = %port.owner_id, code = finding.code(), "{finding}");

            // Conditional on the same call still holding the port past the cutoff.
            if self
                .registry
                .reclaim_stale(&port.owner_id, port.port_number, &call_id, &cutoff)
                .await?
            {
                recording::record_port_reclaimed();
                reclaimed += 1;
            }
        }

        if reclaimed > 0 {
            info!(count = reclaimed, "reclaimed stale busy ports");
        }
        Ok(reclaimed)
    }

    /// Sweep every `interval` until `cancel` fires. Sweep errors are logged and retried.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = interval.as_secs(),
            stale_after_secs = self.stale_after_secs,
            "port watchdog started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep().await {
                Ok(count) => debug!(count, "watchdog sweep finished"),
                Err(e) => warn!(error = %e, "watchdog sweep failed"),
            }
        }
        info!("port watchdog stopped");
    }
}
