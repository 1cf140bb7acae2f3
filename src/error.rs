// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The error taxonomy surfaced by every operation in this crate.
//!
//! Errors are never recovered internally except for the `NOT_READY` retry
//! schedule in [`crate::device::DeviceDriver`]; every other failure is
//! surfaced to the caller unchanged.

use std::fmt;

/// A failure from any driver-core operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// `ping` reported the address as absent.
    NoDeviceAtAddress { address: u8 },
    /// Identity succeeded but the device type has no capability record.
    UnsupportedDevice { device_type: String },
    /// A reply was decoded but did not meet the expected shape.
    ResponseSyntaxError { field_name: String, reason: String },
    /// The retry schedule was exhausted while status remained `NOT_READY`.
    DeviceNotReady { address: u8 },
    /// The device reported `SYNTAX_ERROR` for the command just sent.
    CommandRejected { address: u8, command: String },
    /// Caller-supplied input failed validation.
    RequestValidationError { reason: String },
    /// Session acquisition timed out.
    BusBusy { address: u8 },
    /// The underlying bus adapter returned an I/O failure.
    Io { reason: String },
    /// Anything else unexpected, including configuration parse failures.
    InternalError { reason: String },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::NoDeviceAtAddress { address } => {
                write!(f, "no device responds at address {address}")
            }
            DriverError::UnsupportedDevice { device_type } => {
                write!(f, "unsupported device type \"{device_type}\"")
            }
            DriverError::ResponseSyntaxError { field_name, reason } => {
                write!(f, "malformed response field \"{field_name}\": {reason}")
            }
            DriverError::DeviceNotReady { address } => {
                write!(f, "device at address {address} did not become ready")
            }
            DriverError::CommandRejected { address, command } => {
                write!(
                    f,
                    "device at address {address} rejected command \"{command}\""
                )
            }
            DriverError::RequestValidationError { reason } => {
                write!(f, "invalid request: {reason}")
            }
            DriverError::BusBusy { address } => {
                write!(f, "timed out acquiring the bus session for address {address}")
            }
            DriverError::Io { reason } => write!(f, "i2c bus error: {reason}"),
            DriverError::InternalError { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for DriverError {}

pub type Result<T> = std::result::Result<T, DriverError>;
