// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The raw bus adapter: a minimal three-operation interface over a physical
//! I2C channel. No interpretation of payload, no retries -- that's layered
//! on top by [`crate::session`] and [`crate::device`].

use crate::error::DriverError;

/// Reads pull at least this many bytes from the selected slave.
pub const READ_CHUNK_SIZE: usize = 32;

/// A byte-level I2C transport. Implementations are blocking and must select
/// the slave address atomically with each read or write -- the "select
/// slave, transfer" pair must never be interleaved with another address
/// selection on the same underlying file handle.
pub trait BusAdapter: Send {
    /// True iff `address` acknowledges. Errors other than "no device
    /// responded" propagate.
    fn ping(&mut self, address: u8) -> Result<bool, DriverError>;
    /// Read up to [`READ_CHUNK_SIZE`] bytes from `address`.
    fn read(&mut self, address: u8) -> Result<Vec<u8>, DriverError>;
    /// Write `bytes` to `address`.
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), DriverError>;
}

/// Adapts any blocking `embedded-hal` I2C implementation into a
/// [`BusAdapter`], so the driver core stays decoupled from whichever
/// platform transport (Linux `/dev/i2c-*`, a test double, or an embedded
/// peripheral) is actually moving the bytes.
pub struct EmbeddedHalBus<I2C> {
    i2c: I2C,
}

impl<I2C> EmbeddedHalBus<I2C> {
    pub fn new(i2c: I2C) -> Self {
        EmbeddedHalBus { i2c }
    }
}

impl<I2C> BusAdapter for EmbeddedHalBus<I2C>
where
    I2C: embedded_hal::i2c::I2c + Send,
{
    fn ping(&mut self, address: u8) -> Result<bool, DriverError> {
        use embedded_hal::i2c::{Error, ErrorKind};

        match self.i2c.write(address, &[]) {
            Ok(()) => Ok(true),
            Err(err) if matches!(err.kind(), ErrorKind::NoAcknowledge(_)) => Ok(false),
            Err(err) => Err(DriverError::Io {
                reason: format!("{err:?}"),
            }),
        }
    }

    fn read(&mut self, address: u8) -> Result<Vec<u8>, DriverError> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        self.i2c
            .read(address, &mut buf)
            .map_err(|err| DriverError::Io {
                reason: format!("{err:?}"),
            })?;
        Ok(buf.to_vec())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), DriverError> {
        self.i2c
            .write(address, bytes)
            .map_err(|err| DriverError::Io {
                reason: format!("{err:?}"),
            })
    }
}
