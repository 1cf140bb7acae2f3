// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core data model shared by the capability registry, the codec and the
//! device driver.

use crate::value::ValueType;
use chrono::{DateTime, Utc};

/// A 7-bit I2C slave address, always in `0..=127`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceAddress(pub u8);

impl DeviceAddress {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 127;

    pub fn new(address: u8) -> Option<Self> {
        if address <= Self::MAX {
            Some(DeviceAddress(address))
        } else {
            None
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Identity handshake result. Immutable once attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub address: DeviceAddress,
    pub device_type: String,
    pub firmware_version: String,
    pub vendor: String,
}

impl DeviceInfo {
    pub fn new(address: DeviceAddress, device_type: String, firmware_version: String) -> Self {
        DeviceInfo {
            address,
            device_type,
            firmware_version,
            vendor: "atlas-scientific".to_string(),
        }
    }
}

/// One output a device type can produce, as declared by the capability
/// registry. `unit_code` is always uppercase -- it's the wire token the
/// device echoes back when asked which outputs are enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputUnit {
    pub symbol: String,
    pub unit: String,
    pub unit_code: String,
    pub value_type: ValueType,
}

impl OutputUnit {
    pub fn new(symbol: &str, unit: &str, value_type: ValueType) -> Self {
        OutputUnit {
            symbol: symbol.to_string(),
            unit: unit.to_string(),
            unit_code: symbol.to_ascii_uppercase(),
            value_type,
        }
    }

    pub fn with_unit_code(symbol: &str, unit: &str, unit_code: &str, value_type: ValueType) -> Self {
        OutputUnit {
            symbol: symbol.to_string(),
            unit: unit.to_string(),
            unit_code: unit_code.to_ascii_uppercase(),
            value_type,
        }
    }
}

/// One measured value from a read, carrying the raw scalar text as received.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub symbol: String,
    pub value: String,
    pub value_type: ValueType,
    pub timestamp: DateTime<Utc>,
    pub unit_code: String,
}

/// A caller's assertion of an environmental value to apply before a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationFactor {
    pub factor: String,
    pub symbol: String,
    pub value: String,
}

/// One step in a calibration workflow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalibrationPoint {
    pub point: Option<String>,
    pub actual_value: Option<String>,
}

/// A single configuration write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationParameter {
    pub parameter: String,
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_rejects_out_of_range() {
        assert!(DeviceAddress::new(127).is_some());
        assert!(DeviceAddress::new(128).is_none());
    }

    #[test]
    fn output_unit_code_defaults_to_uppercase_symbol() {
        let u = OutputUnit::new("ph", "pH", ValueType::Float);
        assert_eq!(u.unit_code, "PH");
    }
}
