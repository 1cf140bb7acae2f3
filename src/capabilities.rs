// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The capability registry: a static, load-time-fixed table from
//! device_type to what that device type supports. The driver never asks a
//! device "what can you do" beyond the identity handshake; this table is
//! authoritative.

use crate::model::OutputUnit;
use crate::value::ValueType;

/// Nominal latency (seconds) for a command with no device-specific
/// override: identity and output query/toggle round trips.
pub const DEFAULT_LATENCY: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationCapability {
    pub factor: String,
    pub command: String,
    pub symbol: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCapability {
    pub id: String,
    pub sub_command: Option<String>,
    pub value_type: ValueType,
    pub next_points: Vec<String>,
    pub latency: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationCapability {
    pub parameter: String,
    pub command: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub device_type: String,
    pub outputs: Vec<OutputUnit>,
    pub read_latency: f64,
    pub compensation: Vec<CompensationCapability>,
    pub calibration: Vec<CalibrationCapability>,
    pub configuration: Vec<ConfigurationCapability>,
}

impl DeviceCapabilities {
    pub fn compensation_for(&self, factor: &str) -> Option<&CompensationCapability> {
        let factor = factor.to_ascii_lowercase();
        self.compensation.iter().find(|c| c.factor == factor)
    }

    pub fn calibration_for(&self, id: &str) -> Option<&CalibrationCapability> {
        self.calibration
            .iter()
            .find(|c| c.id.eq_ignore_ascii_case(id))
    }

    pub fn configuration_for(&self, parameter: &str) -> Option<&ConfigurationCapability> {
        let parameter = parameter.to_ascii_lowercase();
        self.configuration.iter().find(|c| c.parameter == parameter)
    }

    pub fn output_by_unit_code(&self, unit_code: &str) -> Option<&OutputUnit> {
        let unit_code = unit_code.to_ascii_uppercase();
        self.outputs.iter().find(|o| o.unit_code == unit_code)
    }

    pub fn supports_temperature_compensation(&self) -> bool {
        self.compensation_for("temperature").is_some()
    }
}

fn name_led_configuration() -> Vec<ConfigurationCapability> {
    vec![
        ConfigurationCapability {
            parameter: "name".to_string(),
            command: "name".to_string(),
            value_type: ValueType::String,
        },
        ConfigurationCapability {
            parameter: "led".to_string(),
            command: "l".to_string(),
            value_type: ValueType::Bool,
        },
    ]
}

fn single_point_calibration(latency: f64) -> Vec<CalibrationCapability> {
    vec![CalibrationCapability {
        id: "any".to_string(),
        sub_command: None,
        value_type: ValueType::None,
        next_points: vec!["Complete".to_string()],
        latency,
    }]
}

/// Look up the capability record for a device type. Unknown types return
/// `None`, which callers map to `DriverError::UnsupportedDevice`.
pub fn lookup(device_type: &str) -> Option<DeviceCapabilities> {
    match device_type.to_ascii_uppercase().as_str() {
        "PH" => Some(DeviceCapabilities {
            device_type: "pH".to_string(),
            outputs: vec![OutputUnit::new("pH", "pH", ValueType::Float)],
            read_latency: 0.9,
            compensation: vec![CompensationCapability {
                factor: "temperature".to_string(),
                command: "T".to_string(),
                symbol: "C".to_string(),
                value_type: ValueType::Float,
            }],
            calibration: vec![
                CalibrationCapability {
                    id: "mid".to_string(),
                    sub_command: Some("mid".to_string()),
                    value_type: ValueType::Float,
                    next_points: vec!["low".to_string(), "Complete".to_string()],
                    latency: 0.9,
                },
                CalibrationCapability {
                    id: "low".to_string(),
                    sub_command: Some("low".to_string()),
                    value_type: ValueType::Float,
                    next_points: vec!["high".to_string(), "Complete".to_string()],
                    latency: 0.9,
                },
                CalibrationCapability {
                    id: "high".to_string(),
                    sub_command: Some("high".to_string()),
                    value_type: ValueType::Float,
                    next_points: vec!["Complete".to_string()],
                    latency: 0.9,
                },
            ],
            configuration: name_led_configuration(),
        }),
        "ORP" => Some(DeviceCapabilities {
            device_type: "ORP".to_string(),
            outputs: vec![OutputUnit::new("mV", "millivolts", ValueType::Float)],
            read_latency: 0.9,
            compensation: vec![],
            calibration: single_point_calibration(0.9),
            configuration: name_led_configuration(),
        }),
        "DO" => Some(DeviceCapabilities {
            device_type: "DO".to_string(),
            outputs: vec![
                OutputUnit::new("%", "percent saturation", ValueType::Float),
                OutputUnit::with_unit_code("mg/L", "milligrams per liter", "MG", ValueType::Float),
            ],
            read_latency: 0.6,
            compensation: vec![
                CompensationCapability {
                    factor: "salinity".to_string(),
                    command: "S".to_string(),
                    symbol: "uS".to_string(),
                    value_type: ValueType::Float,
                },
                CompensationCapability {
                    factor: "pressure".to_string(),
                    command: "P".to_string(),
                    symbol: "KPA".to_string(),
                    value_type: ValueType::Float,
                },
                CompensationCapability {
                    factor: "temperature".to_string(),
                    command: "T".to_string(),
                    symbol: "C".to_string(),
                    value_type: ValueType::Float,
                },
            ],
            calibration: vec![
                CalibrationCapability {
                    id: "atmospheric".to_string(),
                    sub_command: None,
                    value_type: ValueType::None,
                    next_points: vec!["0".to_string(), "Complete".to_string()],
                    latency: 1.3,
                },
                CalibrationCapability {
                    id: "0".to_string(),
                    sub_command: Some("0".to_string()),
                    value_type: ValueType::None,
                    next_points: vec!["Complete".to_string()],
                    latency: 1.3,
                },
            ],
            configuration: name_led_configuration(),
        }),
        "EC" => Some(DeviceCapabilities {
            device_type: "EC".to_string(),
            outputs: vec![
                OutputUnit::new("EC", "electrical conductivity", ValueType::Float),
                OutputUnit::new("TDS", "total dissolved solids", ValueType::Float),
                OutputUnit::new("S", "salinity", ValueType::Float),
                OutputUnit::new("SG", "specific gravity", ValueType::Float),
            ],
            read_latency: 0.6,
            compensation: vec![CompensationCapability {
                factor: "temperature".to_string(),
                command: "T".to_string(),
                symbol: "C".to_string(),
                value_type: ValueType::Float,
            }],
            calibration: vec![
                CalibrationCapability {
                    id: "dry".to_string(),
                    sub_command: Some("dry".to_string()),
                    value_type: ValueType::None,
                    next_points: vec!["any".to_string(), "low".to_string()],
                    latency: 0.6,
                },
                CalibrationCapability {
                    id: "any".to_string(),
                    sub_command: None,
                    value_type: ValueType::Float,
                    next_points: vec!["Complete".to_string()],
                    latency: 0.6,
                },
                CalibrationCapability {
                    id: "low".to_string(),
                    sub_command: Some("low".to_string()),
                    value_type: ValueType::Float,
                    next_points: vec!["high".to_string()],
                    latency: 0.6,
                },
                CalibrationCapability {
                    id: "high".to_string(),
                    sub_command: Some("high".to_string()),
                    value_type: ValueType::Float,
                    next_points: vec!["Complete".to_string()],
                    latency: 0.6,
                },
            ],
            configuration: {
                let mut c = name_led_configuration();
                c.push(ConfigurationCapability {
                    parameter: "k".to_string(),
                    command: "k".to_string(),
                    value_type: ValueType::Float,
                });
                c
            },
        }),
        "CO2" => Some(DeviceCapabilities {
            device_type: "CO2".to_string(),
            outputs: vec![
                OutputUnit::new("ppm", "parts per million", ValueType::Int),
                OutputUnit::with_unit_code("t", "temperature", "T", ValueType::Float),
            ],
            read_latency: 0.9,
            compensation: vec![],
            calibration: vec![],
            configuration: name_led_configuration(),
        }),
        "RTD" => Some(DeviceCapabilities {
            device_type: "RTD".to_string(),
            outputs: vec![OutputUnit::new("t", "temperature", ValueType::Float)],
            read_latency: 0.6,
            compensation: vec![],
            calibration: single_point_calibration(0.6),
            configuration: name_led_configuration(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_device_type_is_absent() {
        assert!(lookup("toaster").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(lookup("ph").is_some());
        assert!(lookup("Ph").is_some());
    }

    #[test]
    fn ec_supports_k_configuration() {
        let caps = lookup("EC").unwrap();
        assert!(caps.configuration_for("K").is_some());
    }

    #[test]
    fn co2_has_no_calibration_workflow() {
        let caps = lookup("CO2").unwrap();
        assert!(caps.calibration.is_empty());
    }

    #[test]
    fn do_mg_output_has_explicit_unit_code() {
        let caps = lookup("DO").unwrap();
        assert!(caps.output_by_unit_code("MG").is_some());
    }
}
