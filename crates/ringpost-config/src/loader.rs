// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./ringpost.toml` > `~/.config/ringpost/ringpost.toml` >
//! `/etc/ringpost/ringpost.toml` with environment variable overrides via `RINGPOST_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::RingpostConfig;

/// Top-level sections addressable from environment variables.
const ENV_SECTIONS: &[&str] = &[
    "service",
    "storage",
    "dialer",
    "watchdog",
    "telephony",
    "api",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/ringpost/ringpost.toml` (system-wide)
/// 3. `~/.config/ringpost/ringpost.toml` (user XDG config)
/// 4. `./ringpost.toml` (local directory)
/// 5. `RINGPOST_*` environment variables
pub fn load_config() -> Result<RingpostConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RingpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingpostConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RingpostConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RingpostConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(RingpostConfig::default()))
        .merge(Toml::file("/etc/ringpost/ringpost.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("ringpost/ringpost.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("ringpost.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider.
///
/// Only the leading section name is turned into a dot so that keys containing
/// underscores survive: `RINGPOST_TELEPHONY_API_KEY` maps to
/// `telephony.api_key`, not `telephony.api.key`.
fn env_provider() -> Env {
    Env::prefixed("RINGPOST_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a prefix-stripped env key to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key
}
