// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus configuration: device path, session timeout, and latency overrides
//! for individual capability commands. Loaded once at startup by a
//! consuming binary; the crate itself never reads the filesystem.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::DriverError;

const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Path to the kernel I2C device node, e.g. `/dev/i2c-1`.
    pub device_path: String,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,
    /// `device_type -> command_name -> latency override (seconds)`.
    #[serde(default)]
    pub latency_overrides: HashMap<String, HashMap<String, f64>>,
}

fn default_session_timeout_secs() -> u64 {
    DEFAULT_SESSION_TIMEOUT_SECS
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            device_path: "/dev/i2c-1".to_string(),
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            latency_overrides: HashMap::new(),
        }
    }
}

impl BusConfig {
    /// Parse a TOML document. Missing keys fall back to the defaults; a
    /// malformed document is not a per-request concern, so it surfaces as
    /// `InternalError` rather than a dedicated config-error variant.
    pub fn from_toml_str(text: &str) -> Result<BusConfig, DriverError> {
        toml::from_str(text).map_err(|err| DriverError::InternalError {
            reason: format!("invalid bus configuration: {err}"),
        })
    }

    /// An override latency for `device_type`'s `command`, if configured.
    pub fn latency_override(&self, device_type: &str, command: &str) -> Option<f64> {
        self.latency_overrides
            .get(device_type)
            .and_then(|commands| commands.get(command))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_thirty_second_timeout() {
        let config = BusConfig::default();
        assert_eq!(config.session_timeout_secs, 30);
        assert!(config.latency_overrides.is_empty());
    }

    #[test]
    fn parses_latency_overrides_by_device_type_and_command() {
        let config = BusConfig::from_toml_str(
            r#"
            device_path = "/dev/i2c-1"
            session_timeout_secs = 15

            [latency_overrides.EC]
            cal = 0.9
            "#,
        )
        .unwrap();

        assert_eq!(config.device_path, "/dev/i2c-1");
        assert_eq!(config.session_timeout_secs, 15);
        assert_eq!(config.latency_override("EC", "cal"), Some(0.9));
        assert_eq!(config.latency_override("EC", "r"), None);
    }

    #[test]
    fn missing_session_timeout_falls_back_to_default() {
        let config = BusConfig::from_toml_str(r#"device_path = "/dev/i2c-1""#).unwrap();
        assert_eq!(config.session_timeout_secs, 30);
    }

    #[test]
    fn malformed_toml_is_an_internal_error() {
        let err = BusConfig::from_toml_str("this is not toml [[[").unwrap_err();
        assert!(matches!(err, DriverError::InternalError { .. }));
    }
}
