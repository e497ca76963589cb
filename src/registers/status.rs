//! Interrupt, mode and command registers
//!
//! The P9221 signals every asynchronous event through the 16-bit interrupt
//! status register and the active-low INT pin:
//! - Power path events (ready, power on)
//! - Protection events (over current, over voltage, over temperature)
//! - Message channel events (TX acknowledge, TX data received)
//!
//! Status bits stay set until cleared by writing the clear mask and issuing
//! the clear-interrupt command.

use core::convert::Infallible;

use bitflags::bitflags;
use regiface::{register, FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

bitflags! {
    /// Interrupt sources of the P9221
    ///
    /// The same bit layout is used by the status, enable and clear registers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct IntFlags: u16 {
        /// Output current limit exceeded
        const OVER_CURRENT = 0x0001;
        /// Rectifier voltage limit exceeded
        const OVER_VOLTAGE = 0x0002;
        /// Die temperature limit exceeded
        const OVER_TEMPERATURE = 0x0004;
        /// The transmitter sent a message into the TX→RX window
        const TX_DATA_RECEIVED = 0x0010;
        /// The transmitter acknowledged the last RX→TX message
        const TX_ACK = 0x0020;
        /// Output LDO is on, the receiver is ready to deliver power
        const READY = 0x0040;
        /// The receiver got powered by a transmitter field
        const POWER_ON = 0x0080;
    }
}

bitflags! {
    /// System mode bits (register 0x004C)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ModeFlags: u8 {
        /// Operating under the WPC (Qi) protocol
        const WPC = 0x01;
        /// Operating under the PMA protocol
        const PMA = 0x02;
        /// Firmware executes from OTP
        const OTP_ONLY = 0x20;
        /// Firmware executes from a patch loaded into SRAM
        const RAM_PROGRAM = 0x40;
    }
}

bitflags! {
    /// Command register bits (register 0x004E)
    ///
    /// Writing a bit triggers the corresponding action. The chip clears the
    /// bit once the action was taken.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandFlags: u8 {
        /// Send the RX→TX message window to the transmitter
        const SEND_RX_DATA = 0x01;
        /// Send an end-power-transfer packet with the reason in 0x003B
        const SEND_EPT = 0x08;
        /// Clear the interrupt bits set in the clear register
        const CLEAR_INTERRUPT = 0x20;
        /// Switch execution to the SRAM patch
        const SWITCH_TO_SRAM = 0x40;
        /// Request the output voltage set in 0x0078 from the transmitter
        const FAST_CHARGE = 0x80;
    }
}

/// Interrupt status register (address: 0x0036)
///
/// Latched interrupt sources. Read-only, see [`InterruptClear`].
#[register(0x0036u16)]
#[derive(Debug, Clone, Copy, PartialEq, ReadableRegister)]
pub struct InterruptStatus {
    /// Latched interrupt sources, unknown bits retained
    pub flags: IntFlags,
}

/// Interrupt enable register (address: 0x0038)
///
/// Only enabled sources drive the INT pin.
#[register(0x0038u16)]
#[derive(Debug, Clone, Copy, PartialEq, ReadableRegister, WritableRegister)]
pub struct InterruptEnable {
    /// Enabled interrupt sources
    pub flags: IntFlags,
}

/// Interrupt clear register (address: 0x0056)
///
/// Bits written here are cleared from the status register when the
/// [`CommandFlags::CLEAR_INTERRUPT`] command is issued.
#[register(0x0056u16)]
#[derive(Debug, Clone, Copy, PartialEq, WritableRegister)]
pub struct InterruptClear {
    /// Interrupt sources to clear
    pub flags: IntFlags,
}

impl InterruptClear {
    /// Clear mask covering every bit of the status register
    pub const ALL: Self = Self {
        flags: IntFlags::from_bits_retain(0xFFFF),
    };
}

/// System mode register (address: 0x004C)
#[register(0x004Cu16)]
#[derive(Debug, Clone, Copy, PartialEq, ReadableRegister)]
pub struct SystemMode {
    /// Current mode bits, unknown bits retained
    pub flags: ModeFlags,
}

impl SystemMode {
    /// Whether a transmitter field is present and a protocol is running.
    pub fn tx_present(&self) -> bool {
        self.flags.intersects(ModeFlags::WPC | ModeFlags::PMA)
    }
}

/// Command register (address: 0x004E)
#[register(0x004Eu16)]
#[derive(Debug, Clone, Copy, PartialEq, WritableRegister)]
pub struct Command {
    /// Actions to trigger
    pub flags: CommandFlags,
}

impl Command {
    /// Creates a command register value triggering `flags`.
    pub const fn new(flags: CommandFlags) -> Self {
        Self { flags }
    }
}

/// Value of [`Command1`] that unlocks the switch to SRAM execution.
pub const COMMAND1_UNLOCK_SWITCH: u8 = 0x5A;

value_register! {
    /// Secondary command register (address: 0x004F)
    ///
    /// Guards the switch to SRAM execution, see [`COMMAND1_UNLOCK_SWITCH`].
    Command1: u8 = 0x004Fu16
}

value_register! {
    /// End-power-transfer reason (address: 0x003B)
    ///
    /// Sent with [`CommandFlags::SEND_EPT`].
    EptReason: u8 = 0x003Bu16
}

value_register! {
    /// LDO ready handshake status (address: 0x3404)
    ///
    /// Set by the chip after the transmitter accepted the LDO ready message
    /// in factory builds. Cleared by writing zero.
    LdoStatus: u8 = 0x3404u16
}

impl FromByteArray for InterruptStatus {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: IntFlags::from_bits_retain(u16::from_le_bytes(bytes)),
        })
    }
}

impl FromByteArray for InterruptEnable {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: IntFlags::from_bits_retain(u16::from_le_bytes(bytes)),
        })
    }
}

impl ToByteArray for InterruptEnable {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.flags.bits().to_le_bytes())
    }
}

impl ToByteArray for InterruptClear {
    type Error = Infallible;
    type Array = [u8; 2];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok(self.flags.bits().to_le_bytes())
    }
}

impl FromByteArray for SystemMode {
    type Error = Infallible;
    type Array = [u8; 1];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self {
            flags: ModeFlags::from_bits_retain(bytes[0]),
        })
    }
}

impl ToByteArray for Command {
    type Error = Infallible;
    type Array = [u8; 1];

    fn to_bytes(self) -> Result<Self::Array, Self::Error> {
        Ok([self.flags.bits()])
    }
}
