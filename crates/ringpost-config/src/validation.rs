// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that serde attributes cannot express:
//! non-zero intervals, timeout ordering, bind addresses and API tokens.

use crate::diagnostic::ConfigError;
use crate::model::RingpostConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing fast.
pub fn validate_config(config: &RingpostConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid(
            "storage.database_path",
            "must not be empty",
        ));
    }

    let dialer = &config.dialer;
    for (field, value) in [
        ("dialer.poll_interval_ms", dialer.poll_interval_ms),
        ("dialer.originate_timeout_secs", dialer.originate_timeout_secs),
        (
            "dialer.gateway_query_timeout_secs",
            dialer.gateway_query_timeout_secs,
        ),
        ("dialer.dial_timeout_secs", dialer.dial_timeout_secs),
        ("dialer.test_call_ceiling_secs", dialer.test_call_ceiling_secs),
        ("watchdog.interval_secs", config.watchdog.interval_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::invalid(field, "must be greater than zero"));
        }
    }

    if dialer.originate_timeout_secs > dialer.dial_timeout_secs {
        errors.push(ConfigError::invalid(
            "dialer.originate_timeout_secs",
            format!(
                "{} exceeds dialer.dial_timeout_secs ({})",
                dialer.originate_timeout_secs, dialer.dial_timeout_secs
            ),
        ));
    }

    // The watchdog must never reclaim a port whose call could still legitimately resolve.
    if config.watchdog.stale_after_secs < dialer.dial_timeout_secs {
        errors.push(ConfigError::invalid(
            "watchdog.stale_after_secs",
            format!(
                "{} is below dialer.dial_timeout_secs ({})",
                config.watchdog.stale_after_secs, dialer.dial_timeout_secs
            ),
        ));
    }

    if config.watchdog.stale_after_secs < dialer.test_call_ceiling_secs {
        errors.push(ConfigError::invalid(
            "watchdog.stale_after_secs",
            format!(
                "{} is below dialer.test_call_ceiling_secs ({})",
                config.watchdog.stale_after_secs, dialer.test_call_ceiling_secs
            ),
        ));
    }

    let base_url = config.telephony.base_url.trim();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        errors.push(ConfigError::invalid(
            "telephony.base_url",
            format!("`{base_url}` must start with http:// or https://"),
        ));
    }

    let host = config.api.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::invalid("api.host", "must not be empty"));
    } else {
        let is_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-');
        if !is_ip && !is_hostname {
            errors.push(ConfigError::invalid(
                "api.host",
                format!("`{host}` is not a valid IP address or hostname"),
            ));
        }
    }

    for (token, owner) in &config.api.tokens {
        if token.trim().is_empty() {
            errors.push(ConfigError::invalid("api.tokens", "token must not be empty"));
        }
        if owner.trim().is_empty() {
            errors.push(ConfigError::invalid(
                "api.tokens",
                "owner id must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error_for(errors: &[ConfigError], wanted: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { field, .. } if field == wanted))
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&RingpostConfig::default()).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = RingpostConfig::default();
        config.storage.database_path = " ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "storage.database_path"));
    }

    #[test]
    fn zero_poll_interval_fails_validation() {
        let mut config = RingpostConfig::default();
        config.dialer.poll_interval_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "dialer.poll_interval_ms"));
    }

    #[test]
    fn stale_after_below_dial_timeout_fails_validation() {
        let mut config = RingpostConfig::default();
        config.dialer.dial_timeout_secs = 300;
        config.watchdog.stale_after_secs = 120;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "watchdog.stale_after_secs"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = RingpostConfig::default();
        config.storage.database_path = String::new();
        config.api.host = String::new();
        config.telephony.base_url = "ftp://pbx".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn empty_token_owner_fails_validation() {
        let mut config = RingpostConfig::default();
        config.api.tokens.insert("tok".to_string(), String::new());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error_for(&errors, "api.tokens"));
    }
}
