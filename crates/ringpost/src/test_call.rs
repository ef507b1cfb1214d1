// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ringpost test-call` command implementation.

use std::time::Duration;

use ringpost_config::model::RingpostConfig;
use ringpost_core::DialerError;

use crate::serve::{build_orchestrator, init_tracing};

/// Grace after the ceiling so the release task finishes before we exit.
const RELEASE_GRACE: Duration = Duration::from_millis(500);

/// Place one test call and keep the process alive until its port is released.
///
/// The port is held for `dialer.test_call_ceiling_secs`; pressing Ctrl+C
/// exits early and leaves the port for the watchdog.
pub async fn run_test_call(
    config: RingpostConfig,
    owner_id: &str,
    campaign_id: &str,
    phone_number: &str,
) -> Result<(), DialerError> {
    init_tracing(&config.service.log_level);

    let (db, orchestrator) = build_orchestrator(&config).await?;
    let placed = orchestrator
        .make_test_call(owner_id, campaign_id, phone_number)
        .await;

    let result = match placed {
        Ok(call) => {
            println!(
                "test call {} placed on port {} (gateway leg {})",
                call.call_id, call.port_number, call.gateway_call_id
            );
            let hold = config.dialer.test_call_ceiling() + RELEASE_GRACE;
            println!("holding for up to {}s", hold.as_secs());
            tokio::select! {
                _ = tokio::time::sleep(hold) => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("interrupted; port {} left to the watchdog", call.port_number);
                }
            }
            Ok(())
        }
        Err(e) => Err(e),
    };

    orchestrator.shutdown().await;
    db.close().await?;
    result
}
