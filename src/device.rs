// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-device cached state, command construction, timing/retry and the
//! public operations a device exposes once attached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::bus::BusAdapter;
use crate::capabilities::{self, DeviceCapabilities, DEFAULT_LATENCY};
use crate::codec::{Response, Status};
use crate::config::BusConfig;
use crate::error::DriverError;
use crate::model::{
    CalibrationPoint, CompensationFactor, ConfigurationParameter, DeviceAddress, DeviceInfo,
    OutputUnit, Sample,
};
use crate::session::{Session, SessionProvider};

/// Wall-clock source, injected so tests can freeze it.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wait source, injected so tests don't actually block.
pub trait Sleep: Send + Sync {
    fn sleep(&self, seconds: f64);
}

pub struct ThreadSleep;

impl Sleep for ThreadSleep {
    fn sleep(&self, seconds: f64) {
        if seconds > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(seconds));
        }
    }
}

/// The wait schedule for a command of nominal latency `l`: the full latency,
/// then three shorter re-read intervals, without rewriting the command.
fn wait_schedule(l: f64) -> [f64; 4] {
    [l, l / 3.0, l / 3.0, l / 3.0]
}

/// A single attached device: its identity, capability record, cached
/// enabled-output list, and the session provider it shares with every
/// other device on the same bus.
pub struct DeviceDriver<B> {
    info: DeviceInfo,
    capabilities: DeviceCapabilities,
    sessions: Arc<SessionProvider<B>>,
    enabled_outputs: Mutex<Option<Vec<OutputUnit>>>,
    clock: Arc<dyn Clock>,
    sleep: Arc<dyn Sleep>,
    config: Arc<BusConfig>,
}

// `Clock` and `Sleep` are trait objects without a `Debug` bound, so this is
// hand-written rather than derived; it only needs to exist to satisfy
// `Result::unwrap_err`'s `Debug` bound on the `Ok` side in tests.
impl<B> std::fmt::Debug for DeviceDriver<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceDriver").finish_non_exhaustive()
    }
}

impl<B: BusAdapter> DeviceDriver<B> {
    /// Run the identity handshake against `address` and, on success, attach
    /// its capability record. `ping` must already have reported the address
    /// as present; callers that haven't pinged map a failed attach to
    /// `NoDeviceAtAddress` themselves (see [`crate::device_bus`]).
    pub fn attach(
        address: DeviceAddress,
        sessions: Arc<SessionProvider<B>>,
        clock: Arc<dyn Clock>,
        sleep: Arc<dyn Sleep>,
        config: Arc<BusConfig>,
    ) -> Result<Self, DriverError> {
        let session = sessions.acquire(address.0)?;
        let response = Self::raw_transact_with(&session, &sleep, "i", DEFAULT_LATENCY)?;

        if response.field_count() < 3 {
            return Err(DriverError::ResponseSyntaxError {
                field_name: "identity".to_string(),
                reason: format!(
                    "expected 3 identity fields, got {}",
                    response.field_count()
                ),
            });
        }
        let device_type = response.get_field("device_type", 1)?.to_string();
        let firmware_version = response.get_field("firmware_version", 2)?.to_string();

        let capabilities = capabilities::lookup(&device_type).ok_or_else(|| {
            DriverError::UnsupportedDevice {
                device_type: device_type.clone(),
            }
        })?;

        let info = DeviceInfo::new(address, device_type, firmware_version);

        Ok(DeviceDriver {
            info,
            capabilities,
            sessions,
            enabled_outputs: Mutex::new(None),
            clock,
            sleep,
            config,
        })
    }

    fn address(&self) -> u8 {
        self.info.address.0
    }

    fn session(&self) -> Result<Session<B>, DriverError> {
        self.sessions.acquire(self.address())
    }

    /// `nominal` unless the bus configuration declares an override for this
    /// device type and wire command.
    fn latency_for(&self, command: &str, nominal: f64) -> f64 {
        self.config
            .latency_override(&self.capabilities.device_type, command)
            .unwrap_or(nominal)
    }

    /// The retry-bearing transaction core, usable before a `DeviceDriver`
    /// exists (identity handshake) or once it does.
    fn raw_transact_with(
        session: &Session<B>,
        sleep: &Arc<dyn Sleep>,
        command: &str,
        latency: f64,
    ) -> Result<Response, DriverError> {
        let address = session.address();
        let mut frame = command.as_bytes().to_vec();
        frame.push(0);
        log::trace!("address {address:#04x}: write {frame:?}");
        session.write(&frame).map_err(|err| {
            log::error!("address {address:#04x}: write failed: {err}");
            err
        })?;

        let schedule = wait_schedule(latency);
        for (attempt, wait) in schedule.iter().enumerate() {
            sleep.sleep(*wait);
            let raw = session.read().map_err(|err| {
                log::error!("address {address:#04x}: read failed: {err}");
                err
            })?;
            log::trace!("address {address:#04x}: read {raw:?}");
            let response = Response::decode(&raw)?;

            match response.status {
                Status::Ok | Status::Ack => {
                    log::debug!(
                        "address {address:#04x}: transaction \"{command}\" succeeded after {} attempt(s)",
                        attempt + 1
                    );
                    return Ok(response);
                }
                Status::SyntaxError => {
                    log::error!(
                        "address {address:#04x}: command \"{command}\" rejected as malformed"
                    );
                    return Err(DriverError::CommandRejected {
                        address,
                        command: command.to_string(),
                    });
                }
                Status::NotReady => {
                    log::warn!(
                        "address {address:#04x}: not ready on attempt {} for \"{command}\"",
                        attempt + 1
                    );
                    continue;
                }
            }
        }

        log::error!("address {address:#04x}: \"{command}\" never became ready");
        Err(DriverError::DeviceNotReady { address })
    }

    fn raw_transact(
        &self,
        session: &Session<B>,
        command: &str,
        latency: f64,
    ) -> Result<Response, DriverError> {
        Self::raw_transact_with(session, &self.sleep, command, latency)
    }

    fn transact(&self, command: &str, latency: f64) -> Result<Response, DriverError> {
        let session = self.session()?;
        self.raw_transact(&session, command, latency)
    }

    /// The identity captured at attach time. Never re-queries the device.
    pub fn get_device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn get_supported_output_measurements(&self) -> &[OutputUnit] {
        &self.capabilities.outputs
    }

    pub fn get_enabled_output_measurements(&self) -> Result<Vec<OutputUnit>, DriverError> {
        let session = self.session()?;
        self.get_enabled_output_measurements_locked(&session)
    }

    fn get_enabled_output_measurements_locked(
        &self,
        session: &Session<B>,
    ) -> Result<Vec<OutputUnit>, DriverError> {
        if let Some(cached) = self.enabled_outputs.lock().unwrap().clone() {
            return Ok(cached);
        }

        let outputs = if self.capabilities.outputs.is_empty() {
            Vec::new()
        } else if self.capabilities.outputs.len() == 1 {
            vec![self.capabilities.outputs[0].clone()]
        } else {
            let response =
                self.raw_transact(session, "o,?", self.latency_for("o", DEFAULT_LATENCY))?;
            let mut enabled = Vec::new();
            for field in response.get_fields("enabled_outputs", 1, response.field_count())? {
                let code = field.to_ascii_uppercase();
                if let Some(unit) = self.capabilities.output_by_unit_code(&code) {
                    enabled.push(unit.clone());
                }
            }
            enabled
        };

        *self.enabled_outputs.lock().unwrap() = Some(outputs.clone());
        Ok(outputs)
    }

    fn invalidate_enabled_outputs(&self) {
        *self.enabled_outputs.lock().unwrap() = None;
    }

    pub fn set_enabled_output_measurements(&self, units: &[String]) -> Result<(), DriverError> {
        let requested: Vec<String> = units.iter().map(|u| u.to_ascii_uppercase()).collect();

        let supported: Vec<String> = self
            .capabilities
            .outputs
            .iter()
            .map(|o| o.unit_code.clone())
            .collect();
        let unsupported: Vec<&String> = requested
            .iter()
            .filter(|u| !supported.contains(u))
            .collect();
        if !unsupported.is_empty() {
            return Err(DriverError::RequestValidationError {
                reason: format!("unsupported output unit(s): {unsupported:?}"),
            });
        }

        let session = self.session()?;
        let currently_enabled: Vec<String> = self
            .get_enabled_output_measurements_locked(&session)?
            .into_iter()
            .map(|o| o.unit_code)
            .collect();

        let to_enable: Vec<&String> = requested
            .iter()
            .filter(|u| !currently_enabled.contains(u))
            .collect();
        let to_disable: Vec<&String> = currently_enabled
            .iter()
            .filter(|u| !requested.contains(u))
            .collect();

        let latency = self.latency_for("o", DEFAULT_LATENCY);
        for unit in to_enable {
            self.raw_transact(&session, &format!("o,{unit},1"), latency)?;
            self.invalidate_enabled_outputs();
        }
        for unit in to_disable {
            self.raw_transact(&session, &format!("o,{unit},0"), latency)?;
            self.invalidate_enabled_outputs();
        }

        Ok(())
    }

    fn set_measurement_compensation_factors_locked(
        &self,
        session: &Session<B>,
        factors: &[CompensationFactor],
    ) -> Result<(), DriverError> {
        for factor in factors {
            let capability = self
                .capabilities
                .compensation_for(&factor.factor)
                .ok_or_else(|| DriverError::RequestValidationError {
                    reason: format!("unsupported compensation factor \"{}\"", factor.factor),
                })?;
            if !capability.symbol.eq_ignore_ascii_case(&factor.symbol) {
                return Err(DriverError::RequestValidationError {
                    reason: format!(
                        "compensation factor \"{}\" expects unit \"{}\", got \"{}\"",
                        factor.factor, capability.symbol, factor.symbol
                    ),
                });
            }
            let value = capability.value_type.validate(&factor.value)?;
            let command = format!("{},{value}", capability.command);
            let latency = self.latency_for(&capability.command.to_ascii_lowercase(), DEFAULT_LATENCY);
            self.raw_transact(session, &command, latency)?;
        }
        Ok(())
    }

    pub fn set_measurement_compensation_factors(
        &self,
        factors: &[CompensationFactor],
    ) -> Result<(), DriverError> {
        let session = self.session()?;
        self.set_measurement_compensation_factors_locked(&session, factors)
    }

    /// Apply any non-temperature compensation, then read. A temperature
    /// factor folds into the read command itself when the device supports
    /// it; otherwise it is dropped rather than rejected.
    pub fn read_sample(&self, factors: &[CompensationFactor]) -> Result<Vec<Sample>, DriverError> {
        let (temperature, other): (Vec<_>, Vec<_>) = factors
            .iter()
            .cloned()
            .partition(|f| f.factor.eq_ignore_ascii_case("temperature"));

        let session = self.session()?;
        if !other.is_empty() {
            self.set_measurement_compensation_factors_locked(&session, &other)?;
        }

        let command = match temperature.first() {
            Some(factor) if self.capabilities.supports_temperature_compensation() => {
                format!("rt,{}", factor.value)
            }
            _ => "r".to_string(),
        };

        let latency = self.latency_for("r", self.capabilities.read_latency);
        let response = self.raw_transact(&session, &command, latency)?;
        let enabled = self.get_enabled_output_measurements_locked(&session)?;
        let now = self.clock.now_utc();

        let mut samples = Vec::with_capacity(enabled.len());
        for (index, unit) in enabled.iter().enumerate() {
            let value = response.get_field("sample", index)?.to_string();
            samples.push(Sample {
                symbol: unit.symbol.clone(),
                value,
                value_type: unit.value_type,
                timestamp: now,
                unit_code: unit.unit_code.clone(),
            });
        }
        Ok(samples)
    }

    pub fn set_calibration_point(&self, point: &CalibrationPoint) -> Result<(), DriverError> {
        let id = point
            .point
            .as_deref()
            .ok_or_else(|| DriverError::RequestValidationError {
                reason: "calibration point requires an id".to_string(),
            })?;
        let capability = self.capabilities.calibration_for(id).ok_or_else(|| {
            DriverError::RequestValidationError {
                reason: format!("unknown calibration point \"{id}\""),
            }
        })?;

        let mut command = "Cal".to_string();
        if let Some(sub_command) = &capability.sub_command {
            command.push(',');
            command.push_str(sub_command);
        }
        if capability.value_type != crate::value::ValueType::None {
            let raw = point.actual_value.as_deref().ok_or_else(|| {
                DriverError::RequestValidationError {
                    reason: format!("calibration point \"{id}\" requires a value"),
                }
            })?;
            let value = capability.value_type.validate(raw)?;
            command.push(',');
            command.push_str(&value);
        }

        let latency = self.latency_for("cal", capability.latency);
        self.transact(&command, latency)?;
        Ok(())
    }

    pub fn set_configuration_parameter(
        &self,
        param: &ConfigurationParameter,
    ) -> Result<(), DriverError> {
        let capability = self
            .capabilities
            .configuration_for(&param.parameter)
            .ok_or_else(|| DriverError::RequestValidationError {
                reason: format!("unknown configuration parameter \"{}\"", param.parameter),
            })?;
        let value = capability.value_type.validate(&param.value)?;
        let command = format!("{},{value}", capability.command);
        let latency = self.latency_for(&capability.command.to_ascii_lowercase(), DEFAULT_LATENCY);
        self.transact(&command, latency)?;
        Ok(())
    }
}
