//! Message channel registers
//!
//! The receiver talks to the transmitter through two register windows:
//! - RX→TX: header, command and up to four payload bytes, sent with the
//!   [`CommandFlags::SEND_RX_DATA`](super::CommandFlags::SEND_RX_DATA) command
//! - TX→RX: command and up to four payload bytes, announced with the
//!   [`IntFlags::TX_DATA_RECEIVED`](super::IntFlags::TX_DATA_RECEIVED) interrupt

use core::convert::Infallible;

use regiface::{FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

/// Start of the RX→TX payload bytes.
pub const RX_TO_TX_DATA_ADDR: u16 = 0x0052;

/// Size of the RX→TX payload area.
pub const RX_TO_TX_DATA_LEN: usize = 4;

/// Start of the TX→RX window (command byte followed by payload).
pub const TX_TO_RX_DATA_ADDR: u16 = 0x0058;

/// Size of the TX→RX window.
pub const TX_TO_RX_DATA_LEN: usize = 5;

value_register! {
    /// RX→TX packet header (address: 0x0050)
    RxToTxHeader: u8 = 0x0050u16
}

value_register! {
    /// RX→TX command byte (address: 0x0051)
    RxToTxCommand: u8 = 0x0051u16
}
