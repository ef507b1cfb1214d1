// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ringpost serve` command implementation.
//!
//! Wires storage, the HTTP call gateway and the engine together, resumes jobs
//! left running by a previous process, then serves the job control API until
//! a shutdown signal arrives.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use ringpost_api::{ApiState, AuthConfig, HealthState, ServerConfig};
use ringpost_config::model::RingpostConfig;
use ringpost_core::DialerError;
use ringpost_engine::{
    AmdOutcomeClassifier, CampaignOrchestrator, DialerContext, PortWatchdog, recording, shutdown,
};
use ringpost_storage::{Database, SqliteCampaignDirectory};
use ringpost_telephony::HttpCallGateway;
use tracing::{error, info, warn};

/// Crates whose targets follow the configured log level.
const LOG_TARGETS: &[&str] = &[
    "ringpost",
    "ringpost_api",
    "ringpost_config",
    "ringpost_engine",
    "ringpost_storage",
    "ringpost_telephony",
];

/// Open the database and assemble an orchestrator over the HTTP gateway.
///
/// No loops are spawned here; callers decide whether to [`recover`](CampaignOrchestrator::recover).
pub(crate) async fn build_orchestrator(
    config: &RingpostConfig,
) -> Result<(Database, CampaignOrchestrator), DialerError> {
    let db = Database::from_config(&config.storage).await?;
    let gateway = HttpCallGateway::new(&config.telephony)?;
    let ctx = Arc::new(DialerContext::new(
        db.clone(),
        Arc::new(gateway),
        Arc::new(AmdOutcomeClassifier),
        Arc::new(SqliteCampaignDirectory::new(db.clone())),
        config.dialer.clone(),
    ));
    Ok((db, CampaignOrchestrator::new(ctx)))
}

/// Runs the `ringpost serve` command.
pub async fn run_serve(config: RingpostConfig) -> Result<(), DialerError> {
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "starting ringpost serve");

    let prometheus_render = install_metrics();

    let (db, orchestrator) = build_orchestrator(&config).await?;

    // Crash recovery: jobs still starting/running/paused get their loops back.
    let recovered = orchestrator.recover().await?;
    info!(recovered, "job recovery complete");

    let cancel = shutdown::install_signal_handler();

    let watchdog_task = if config.watchdog.enabled {
        let watchdog = PortWatchdog::new(
            orchestrator.registry().clone(),
            config.watchdog.stale_after_secs,
        );
        Some(tokio::spawn(
            watchdog.run(config.watchdog.interval(), cancel.clone()),
        ))
    } else {
        info!("port watchdog disabled");
        None
    };

    if config.api.enabled {
        let state = ApiState {
            orchestrator: orchestrator.clone(),
            auth: AuthConfig::new(config.api.tokens.clone()),
            health: HealthState::new(prometheus_render),
        };
        let server_config = ServerConfig {
            host: config.api.host.clone(),
            port: config.api.port,
        };
        // A bind failure is fatal; serve errors after startup end the process too.
        if let Err(e) = ringpost_api::start_server(&server_config, state, cancel.clone()).await {
            error!(error = %e, "api server failed");
            cancel.cancel();
            orchestrator.shutdown().await;
            return Err(e);
        }
    } else {
        info!("api disabled, running headless");
        cancel.cancelled().await;
    }

    orchestrator.shutdown().await;
    if let Some(task) = watchdog_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "watchdog task ended abnormally");
    }
    db.close().await?;

    info!("ringpost serve shutdown complete");
    Ok(())
}

/// Install the Prometheus recorder and hand back its render function.
///
/// A failure is logged and metrics stay no-ops.
fn install_metrics() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            recording::register_metrics();
            info!("prometheus metrics recorder installed");
            Some(Arc::new(move || handle.render()))
        }
        Err(e) => {
            warn!(error = %e, "failed to install prometheus recorder, metrics disabled");
            None
        }
    }
}

fn env_filter_directive(log_level: &str) -> String {
    let mut directive: Vec<String> = LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={log_level}"))
        .collect();
    directive.push("tower_http=info".to_string());
    directive.push("warn".to_string());
    directive.join(",")
}

/// Initialize the tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env_filter_directive(log_level)));

    // try_init: a second subscriber (tests, repeated CLI calls) is not an error.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directive_covers_workspace_crates() {
        let directive = env_filter_directive("debug");
        assert!(directive.contains("ringpost_engine=debug"));
        assert!(directive.contains("ringpost_api=debug"));
        assert!(directive.ends_with(",warn"));
        tracing_subscriber::EnvFilter::try_new(&directive).expect("directive must parse");
    }

    #[tokio::test]
    async fn build_orchestrator_opens_fresh_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RingpostConfig::default();
        config.storage.database_path = dir
            .path()
            .join("nested/ringpost.db")
            .to_string_lossy()
            .into_owned();

        let (db, orchestrator) = build_orchestrator(&config).await.unwrap();
        assert_eq!(orchestrator.recover().await.unwrap(), 0);
        assert_eq!(orchestrator.active_loops(), 0);
        orchestrator.shutdown().await;
        db.close().await.unwrap();
        assert!(dir.path().join("nested/ringpost.db").exists());
    }
}
