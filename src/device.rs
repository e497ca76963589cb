//! P9221 Register Access Interface
//!
//! This module provides the register-level interface to the P9221 over I2C.
//! The chip exposes a flat 16-bit register address space. Every transfer
//! starts with the register address, big-endian, followed by the payload on
//! writes or by a repeated start and the read phase on reads.
//!
//! The interface is built around the `Device<I2C, D>` struct which wraps an I2C
//! bus and provides methods for:
//! - Reading and writing raw register blocks
//! - Byte and little-endian word convenience accessors
//! - Reading and writing typed registers
//!
//! Every bus operation is attempted up to [`BUS_RETRY_COUNT`] times with
//! [`BUS_RETRY_DELAY_MS`] between attempts. Callers must not retry on top.
//!
//! All methods take `&self`, so the interrupt worker and the command context
//! can share one `Device`. Each transfer claims the bus through an
//! [`AtomicCell`] without masking interrupts. A transfer that finds the bus
//! claimed by the other context counts as a failed attempt and is retried
//! after the retry delay.
//!
//! # Example
//! ```no_run
//! use idtp9221::{registers::SystemMode, Device};
//!
//! # fn example<I2C: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs + Clone>(i2c: I2C, delay: D) -> Result<(), idtp9221::Error> {
//! let device = Device::new(i2c, delay);
//!
//! let mode: SystemMode = device.read_register()?;
//! device.write_byte(0x004E, 0x20)?;
//! # Ok(())
//! # }
//! ```

use core::convert::Infallible;

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, Operation},
};
use embedded_hal_bus::{
    i2c::{AtomicDevice, AtomicError},
    util::AtomicCell,
};
use regiface::{ByteArray, ReadableRegister, WritableRegister};

use crate::Error;

/// 7-bit I2C address of the P9221.
pub const DEFAULT_ADDRESS: u8 = 0x61;

/// Attempts per bus operation before giving up.
pub const BUS_RETRY_COUNT: usize = 3;

/// Delay between two attempts of the same bus operation.
pub const BUS_RETRY_DELAY_MS: u32 = 5;

/// Register-level interface to the P9221.
pub struct Device<I2C, D> {
    i2c: AtomicCell<I2C>,
    delay: D,
    address: u8,
}

impl<I2C, D> Device<I2C, D> {
    /// Creates a new Device using the default chip address.
    ///
    /// # Arguments
    /// * `i2c` - An I2C bus implementing the embedded-hal traits
    /// * `delay` - A delay provider, cloned whenever a caller needs to sleep
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Creates a new Device talking to a non-default chip address.
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c: AtomicCell::new(i2c),
            delay,
            address,
        }
    }
}

impl<I2C, D> Device<I2C, D>
where
    D: DelayNs + Clone,
{
    /// Blocks the calling context for `ms` milliseconds.
    pub fn sleep_ms(&self, ms: u32) {
        self.delay.clone().delay_ms(ms);
    }
}

impl<I2C, D> Device<I2C, D>
where
    I2C: I2c,
    D: DelayNs + Clone,
{
    fn with_retry(
        &self,
        mut transfer: impl FnMut(
            &mut AtomicDevice<'_, I2C>,
            u8,
        ) -> Result<(), AtomicError<I2C::Error>>,
    ) -> Result<(), Error> {
        for attempt in 0..BUS_RETRY_COUNT {
            let mut i2c = AtomicDevice::new(&self.i2c);

            match transfer(&mut i2c, self.address) {
                Ok(()) => return Ok(()),
                Err(AtomicError::Busy) => {
                    trace!("bus busy, attempt {}", attempt);
                }
                Err(AtomicError::Other(_)) => {
                    trace!("bus error, attempt {}", attempt);
                }
            }

            if attempt + 1 < BUS_RETRY_COUNT {
                self.sleep_ms(BUS_RETRY_DELAY_MS);
            }
        }

        Err(Error::Bus)
    }

    /// Reads `bytes.len()` bytes starting at register `reg`.
    ///
    /// # Errors
    /// * `Error::Bus` - I2C communication failed on every attempt
    pub fn read_block(&self, reg: u16, bytes: &mut [u8]) -> Result<(), Error> {
        let header = reg.to_be_bytes();

        self.with_retry(|i2c, address| i2c.write_read(address, &header, &mut *bytes))
            .inspect_err(|_| {
                error!("read block failed, start reg {:#x}", reg);
            })
    }

    /// Writes `bytes` starting at register `reg`.
    ///
    /// The address and the payload are sent in a single write transfer.
    ///
    /// # Errors
    /// * `Error::Bus` - I2C communication failed on every attempt
    pub fn write_block(&self, reg: u16, bytes: &[u8]) -> Result<(), Error> {
        let header = reg.to_be_bytes();

        self.with_retry(|i2c, address| {
            i2c.transaction(
                address,
                &mut [Operation::Write(header.as_slice()), Operation::Write(bytes)],
            )
        })
        .inspect_err(|_| {
            error!("write block failed, start reg {:#x}", reg);
        })
    }

    /// Reads a single byte register.
    pub fn read_byte(&self, reg: u16) -> Result<u8, Error> {
        let mut value = [0u8; 1];
        self.read_block(reg, &mut value)?;
        Ok(value[0])
    }

    /// Reads a little-endian word register.
    pub fn read_word(&self, reg: u16) -> Result<u16, Error> {
        let mut value = [0u8; 2];
        self.read_block(reg, &mut value)?;
        Ok(u16::from_le_bytes(value))
    }

    /// Writes a single byte register.
    pub fn write_byte(&self, reg: u16, value: u8) -> Result<(), Error> {
        self.write_block(reg, &[value])
    }

    /// Writes a little-endian word register.
    pub fn write_word(&self, reg: u16, value: u16) -> Result<(), Error> {
        self.write_block(reg, &value.to_le_bytes())
    }

    /// Reads a register value from the device.
    ///
    /// # Type Parameters
    /// * `R` - Register type implementing ReadableRegister with u16 ID
    ///
    /// # Errors
    /// * `Error::Bus` - I2C communication failed
    /// * `Error::InvalidData` - Failed to parse register value
    pub fn read_register<R>(&self) -> Result<R, Error>
    where
        R: ReadableRegister<IdType = u16>,
    {
        let mut raw_value = R::Array::new();
        self.read_block(R::id(), raw_value.as_mut())?;

        R::from_bytes(raw_value).map_err(|_| Error::InvalidData)
    }

    /// Writes a value to a device register.
    ///
    /// # Type Parameters
    /// * `R` - Register type implementing WritableRegister with u16 ID
    ///
    /// # Errors
    /// * `Error::Bus` - I2C communication failed
    pub fn write_register<R>(&self, register: R) -> Result<(), Error>
    where
        R: WritableRegister<IdType = u16, Error = Infallible>,
    {
        let raw_value = match register.to_bytes() {
            Ok(raw_value) => raw_value,
            Err(never) => match never {},
        };

        self.write_block(R::id(), raw_value.as_ref())
    }
}
