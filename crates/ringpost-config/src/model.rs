// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Ringpost campaign dialer.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Ringpost configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RingpostConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Dispatch loop timing.
    #[serde(default)]
    pub dialer: DialerConfig,

    /// Stale busy-port reclamation.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Telephony control plane connection.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Job control HTTP surface.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "ringpost".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("ringpost").join("ringpost.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("ringpost.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Dispatch loop timing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DialerConfig {
    /// Interval between dispatch loop ticks, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the gateway to accept an originate request.
    #[serde(default = "default_originate_timeout_secs")]
    pub originate_timeout_secs: u64,

    /// Upper bound on a single status query.
    #[serde(default = "default_gateway_query_timeout_secs")]
    pub gateway_query_timeout_secs: u64,

    /// Dial-timeout ceiling: an attempt unresolved for this long is forced
    /// to a gateway failure and its port released. Campaigns may override it.
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// How long a job may go without reserving any port (and with nothing in
    /// flight) before it is marked failed.
    #[serde(default = "default_capacity_grace_secs")]
    pub capacity_grace_secs: u64,

    /// Ceiling after which a test call's port is released regardless of outcome.
    #[serde(default = "default_test_call_ceiling_secs")]
    pub test_call_ceiling_secs: u64,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            originate_timeout_secs: default_originate_timeout_secs(),
            gateway_query_timeout_secs: default_gateway_query_timeout_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            capacity_grace_secs: default_capacity_grace_secs(),
            test_call_ceiling_secs: default_test_call_ceiling_secs(),
        }
    }
}

impl DialerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn originate_timeout(&self) -> Duration {
        Duration::from_secs(self.originate_timeout_secs)
    }

    pub fn gateway_query_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_query_timeout_secs)
    }

    pub fn capacity_grace(&self) -> Duration {
        Duration::from_secs(self.capacity_grace_secs)
    }

    pub fn test_call_ceiling(&self) -> Duration {
        Duration::from_secs(self.test_call_ceiling_secs)
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_originate_timeout_secs() -> u64 {
    10
}

fn default_gateway_query_timeout_secs() -> u64 {
    5
}

fn default_dial_timeout_secs() -> u64 {
    180
}

fn default_capacity_grace_secs() -> u64 {
    300
}

fn default_test_call_ceiling_secs() -> u64 {
    30
}

/// Watchdog sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Run the periodic sweep in `serve`.
    #[serde(default = "default_watchdog_enabled")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,

    /// A busy port older than this with no unresolved attempt is reclaimed.
    /// Must be at least `dialer.dial_timeout_secs`.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_watchdog_enabled(),
            interval_secs: default_watchdog_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl WatchdogConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_watchdog_enabled() -> bool {
    true
}

fn default_watchdog_interval_secs() -> u64 {
    60
}

fn default_stale_after_secs() -> u64 {
    600
}

/// Telephony control plane configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelephonyConfig {
    /// Base URL of the call control API, e.g. `https://pbx.example.com/api`.
    #[serde(default = "default_telephony_base_url")]
    pub base_url: String,

    /// API key sent as a bearer token. `None` sends no authorization header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            base_url: default_telephony_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_telephony_base_url() -> String {
    "http://127.0.0.1:8088".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Job control HTTP surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Serve the HTTP API from `ringpost serve`.
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,

    /// Host address to bind.
    #[serde(default = "default_api_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Bearer token -> owner id. Requests are authorized as that owner.
    #[serde(default)]
    pub tokens: BTreeMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            host: default_api_host(),
            port: default_api_port(),
            tokens: BTreeMap::new(),
        }
    }
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    3180
}
