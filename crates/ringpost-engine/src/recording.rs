// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. Without an installed recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};
use ringpost_core::CallOutcome;

/// Register all Ringpost metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("ringpost_calls_placed_total", "Calls accepted by the gateway");
    describe_counter!("ringpost_call_outcomes_total", "Finalized call attempts by outcome");
    describe_counter!(
        "ringpost_allocation_races_lost_total",
        "markBusy attempts that found the port already taken"
    );
    describe_counter!(
        "ringpost_ports_reclaimed_total",
        "Stale busy ports released by the watchdog"
    );
    describe_counter!("ringpost_test_calls_total", "Test calls placed");
    describe_gauge!("ringpost_active_jobs", "Dispatch loops currently running");
}

pub fn record_call_placed(is_test: bool) {
    if is_test {
        metrics::counter!("ringpost_test_calls_total").increment(1);
    } else {
        metrics::counter!("ringpost_calls_placed_total").increment(1);
    }
}

pub fn record_outcome(outcome: CallOutcome) {
    metrics::counter!("ringpost_call_outcomes_total", "outcome" => outcome.to_string())
        .increment(1);
}

pub fn record_allocation_race_lost() {
    metrics::counter!("ringpost_allocation_races_lost_total").increment(1);
}

pub fn record_port_reclaimed() {
    metrics::counter!("ringpost_ports_reclaimed_total").increment(1);
}

pub fn set_active_jobs(count: usize) {
    metrics::gauge!("ringpost_active_jobs").set(count as f64);
}
