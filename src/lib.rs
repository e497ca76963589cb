#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(any(feature = "defmt", feature = "log")), allow(unused_variables))]
//! IDT P9221 Wireless Power Receiver Driver
//!
//! This crate drives the IDT P9221 Qi (WPC/PMA) wireless power receiver over
//! I2C. It covers the whole receiver side of a wireless charging link: chip
//! telemetry and output control, OTP and SRAM firmware programming, the
//! proprietary message channel to the power transmitter, and the interrupt
//! state machine that ties them together.
//!
//! # Architecture
//! The driver is organized in layers, leaves first:
//!
//! - [`device`]: register access over I2C with bounded retry
//!   - 16-bit big-endian register addresses, little-endian register values
//!   - Typed register access through `regiface`
//!
//! - [`registers`]: register definitions
//!   - [`registers::status`]: interrupt and mode registers
//!   - [`registers::telemetry`]: ADC readings and output control
//!   - [`registers::identity`]: chip ID and firmware version
//!   - [`registers::otp`]: OTP/SRAM programming registers and windows
//!
//! - Low-level chip operations ([`chip`], [`firmware`])
//! - [`protocol`]: RX→TX and TX→RX message frames and the send/receive engine
//! - [`irq`]: interrupt dispatch, abnormal interrupt storm detection
//! - [`negotiation`]: certification, transmitter discovery and reporting
//!
//! # Concurrency
//! The driver context [`Idtp9221`] is shared by reference between three
//! contexts:
//!
//! 1. The interrupt trigger, which calls [`Idtp9221::on_interrupt`]. It never
//!    blocks and only flips an atomic flag.
//! 2. A worker that calls [`Idtp9221::service_interrupt`] whenever the trigger
//!    asked for it (see [`worker::run_irq_worker`]).
//! 3. The charging orchestration, which calls the command methods.
//!
//! Acknowledgements and received data travel from the worker to the command
//! methods through atomic flags, so at most one protocol exchange may be in
//! flight at a time.
//!
//! The command methods poll those flags with blocking sleeps. The worker has
//! to make progress while a command method sleeps, so it must run on a
//! higher priority executor than the caller (for example an interrupt
//! executor) or on its own thread. On a single cooperative executor shared
//! with the caller the worker never runs during an exchange, and every
//! acknowledged send fails with [`Error::NoAck`].
//!
//! Both contexts share the I2C bus through an `embedded-hal-bus` atomic
//! cell. Interrupts stay enabled during transfers. A transfer that finds the
//! bus claimed by the other context is retried like any failed transfer.
//!
//! # Example
//! ```no_run
//! use embedded_hal::{delay::DelayNs, i2c::I2c};
//! use idtp9221::{Config, Error, Idtp9221, Platform};
//!
//! fn bring_up<I2C, D, P>(i2c: I2C, delay: D, platform: P) -> Result<(), Error>
//! where
//!     I2C: I2c,
//!     D: DelayNs + Clone,
//!     P: Platform,
//! {
//!     let rx = Idtp9221::new(i2c, delay, platform, Config::default());
//!     rx.start();
//!
//!     if rx.check_tx_exist() {
//!         let vrect = rx.get_rx_vrect()?;
//!         let capability = rx.get_tx_capability()?;
//!         let _ = (vrect, capability);
//!     }
//!     Ok(())
//! }
//! ```

#[macro_use]
mod fmt;

pub mod chip;
pub mod config;
pub mod device;
pub mod firmware;
pub mod irq;
pub mod negotiation;
pub mod protocol;
pub mod receiver;
pub mod registers;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{Config, FirmwareSet, FodCoefficients, FOD_COEF_LEN};
pub use device::Device;
pub use firmware::{FirmwareVersion, SramPatch};
pub use irq::{AbnormalIrqDetector, Event};
pub use negotiation::{AdapterType, CertificationResult, TxCapability, TxCapabilityFlags};
pub use protocol::{Frame, MessageCommand};
pub use receiver::{Idtp9221, Platform, WiredChannel};

/// Errors reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// The bus transfer failed on every retry
    Bus,
    /// A register returned a value that cannot be interpreted
    InvalidData,
    /// An argument was outside of its allowed range. Nothing was sent.
    OutOfRange,
    /// The transmitter did not acknowledge a message
    NoAck,
    /// The transmitter did not answer a request
    NoData,
    /// The transmitter answered with a different command than requested
    UnexpectedCommand {
        /// Command byte the driver waited for
        expected: u8,
        /// Command byte found in the TX→RX window
        actual: u8,
    },
    /// Charging was stopped while waiting for the transmitter
    Stopped,
    /// Data read back from the chip differs from what was written
    Verify,
    /// The bootloader rejected an OTP page with the given status
    OtpWrite(u8),
    /// The chip is not in a mode that allows the operation
    WrongMode,
    /// The chip did not reach the expected state in time
    Timeout,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus => f.write_str("bus transfer failed"),
            Error::InvalidData => f.write_str("invalid register data"),
            Error::OutOfRange => f.write_str("argument out of range"),
            Error::NoAck => f.write_str("no acknowledge from transmitter"),
            Error::NoData => f.write_str("no data from transmitter"),
            Error::UnexpectedCommand { expected, actual } => write!(
                f,
                "unexpected command {:#04x}, expected {:#04x}",
                actual, expected
            ),
            Error::Stopped => f.write_str("charging stopped"),
            Error::Verify => f.write_str("read back does not match written data"),
            Error::OtpWrite(status) => write!(f, "OTP write failed with status {:#04x}", status),
            Error::WrongMode => f.write_str("chip is in the wrong mode"),
            Error::Timeout => f.write_str("timed out"),
        }
    }
}
