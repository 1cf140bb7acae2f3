// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command/response driver core for Atlas Scientific I2C water-quality
//! probes: a capability model, a retrying request/response engine, and bus
//! arbitration sitting above a raw I2C byte channel.
//!
//! HTTP routing, request-body validation and the kernel I2C driver itself
//! are collaborators outside this crate. This crate exposes blocking,
//! thread-safe operations that a handler layer calls directly.

pub mod bus;
pub mod capabilities;
pub mod codec;
pub mod config;
pub mod device;
pub mod device_bus;
pub mod error;
pub mod model;
pub mod session;
pub mod value;

pub use bus::{BusAdapter, EmbeddedHalBus};
pub use capabilities::{
    CalibrationCapability, CompensationCapability, ConfigurationCapability, DeviceCapabilities,
};
pub use config::BusConfig;
pub use device::{Clock, DeviceDriver, Sleep, SystemClock, ThreadSleep};
pub use device_bus::DeviceBus;
pub use error::{DriverError, Result};
pub use model::{
    CalibrationPoint, CompensationFactor, ConfigurationParameter, DeviceAddress, DeviceInfo,
    OutputUnit, Sample,
};
pub use value::ValueType;
