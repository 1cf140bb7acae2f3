// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Enumeration and per-address caching of attached devices over one shared
//! bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::bus::BusAdapter;
use crate::config::BusConfig;
use crate::device::{Clock, DeviceDriver, Sleep, SystemClock, ThreadSleep};
use crate::error::DriverError;
use crate::model::DeviceAddress;
use crate::session::SessionProvider;

/// Owns the shared session provider and the set of devices that have
/// answered so far. At most one [`DeviceDriver`] exists per address.
pub struct DeviceBus<B> {
    sessions: Arc<SessionProvider<B>>,
    known: Mutex<HashMap<u8, Arc<DeviceDriver<B>>>>,
    clock: Arc<dyn Clock>,
    sleep: Arc<dyn Sleep>,
    config: Arc<BusConfig>,
}

impl<B: BusAdapter> DeviceBus<B> {
    pub fn new(bus: B, config: BusConfig) -> Self {
        let session_timeout = Duration::from_secs(config.session_timeout_secs);
        DeviceBus {
            sessions: Arc::new(SessionProvider::new(bus, session_timeout)),
            known: Mutex::new(HashMap::new()),
            clock: Arc::new(SystemClock),
            sleep: Arc::new(ThreadSleep),
            config: Arc::new(config),
        }
    }

    #[cfg(test)]
    fn with_clock_and_sleep(
        bus: B,
        config: BusConfig,
        clock: Arc<dyn Clock>,
        sleep: Arc<dyn Sleep>,
    ) -> Self {
        let session_timeout = Duration::from_secs(config.session_timeout_secs);
        DeviceBus {
            sessions: Arc::new(SessionProvider::new(bus, session_timeout)),
            known: Mutex::new(HashMap::new()),
            clock,
            sleep,
            config: Arc::new(config),
        }
    }

    /// Attempt attach at `address`: ping first (absence -> `NoDeviceAtAddress`
    /// without consulting the device driver at all), then the identity
    /// handshake. Failures are never cached.
    fn attach(&self, address: DeviceAddress) -> Result<Arc<DeviceDriver<B>>, DriverError> {
        {
            let session = self.sessions.acquire(address.0)?;
            if !session.ping()? {
                return Err(DriverError::NoDeviceAtAddress { address: address.0 });
            }
        }

        let driver = DeviceDriver::attach(
            address,
            self.sessions.clone(),
            self.clock.clone(),
            self.sleep.clone(),
            self.config.clone(),
        )?;
        let driver = Arc::new(driver);
        self.known.lock().unwrap().insert(address.0, driver.clone());
        Ok(driver)
    }

    /// Sweep every address in 0..=127, keeping whatever answers. Individual
    /// failures are swallowed: a non-responding or unsupported address is
    /// simply absent from the result.
    pub fn scan(&self) -> Vec<Arc<DeviceDriver<B>>> {
        (DeviceAddress::MIN..=DeviceAddress::MAX)
            .filter_map(|raw| {
                let address = DeviceAddress::new(raw)?;
                self.attach(address).ok()
            })
            .collect()
    }

    pub fn get_known_devices(&self) -> Vec<Arc<DeviceDriver<B>>> {
        self.known.lock().unwrap().values().cloned().collect()
    }

    pub fn get_device_by_address(
        &self,
        address: DeviceAddress,
    ) -> Result<Arc<DeviceDriver<B>>, DriverError> {
        if let Some(driver) = self.known.lock().unwrap().get(&address.0) {
            return Ok(driver.clone());
        }
        self.attach(address)
    }

    pub fn forget(&self) {
        self.known.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockBus {
        present: Vec<u8>,
        reads: VecDeque<Vec<u8>>,
    }

    impl BusAdapter for MockBus {
        fn ping(&mut self, address: u8) -> Result<bool, DriverError> {
            Ok(self.present.contains(&address))
        }

        fn read(&mut self, _address: u8) -> Result<Vec<u8>, DriverError> {
            self.reads.pop_front().ok_or(DriverError::Io {
                reason: "mock bus has no more scripted reads".to_string(),
            })
        }

        fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn identity(body: &str) -> Vec<u8> {
        let mut v = vec![0x01u8];
        v.extend_from_slice(body.as_bytes());
        v.push(0);
        v
    }

    #[test]
    fn absent_address_reports_no_device() {
        let bus = MockBus {
            present: vec![],
            reads: VecDeque::new(),
        };
        let device_bus = DeviceBus::new(bus, BusConfig::default());
        let err = device_bus
            .get_device_by_address(DeviceAddress::new(10).unwrap())
            .unwrap_err();
        assert_eq!(err, DriverError::NoDeviceAtAddress { address: 10 });
    }

    #[test]
    fn second_lookup_returns_cached_device_without_another_attach() {
        let bus = MockBus {
            present: vec![99],
            reads: vec![identity("?I,PH,1.98")].into(),
        };
        let device_bus = DeviceBus::with_clock_and_sleep(
            bus,
            BusConfig::default(),
            Arc::new(SystemClock),
            Arc::new(crate::device::ThreadSleep),
        );

        let address = DeviceAddress::new(99).unwrap();
        let first = device_bus.get_device_by_address(address).unwrap();
        let second = device_bus.get_device_by_address(address).unwrap();
        assert_eq!(first.get_device_info().address, second.get_device_info().address);
        assert_eq!(device_bus.get_known_devices().len(), 1);
    }

    #[test]
    fn forget_clears_the_cache() {
        let bus = MockBus {
            present: vec![99],
            reads: vec![identity("?I,PH,1.98")].into(),
        };
        let device_bus = DeviceBus::new(bus, BusConfig::default());
        device_bus
            .get_device_by_address(DeviceAddress::new(99).unwrap())
            .unwrap();
        assert_eq!(device_bus.get_known_devices().len(), 1);
        device_bus.forget();
        assert_eq!(device_bus.get_known_devices().len(), 0);
    }
}
