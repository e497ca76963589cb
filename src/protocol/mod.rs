//! Message channel to the power transmitter
//!
//! The receiver sends short packets to the transmitter by modulating its
//! load; the transmitter answers by modulating its field. The P9221 hides
//! the modulation behind two register windows:
//!
//! ```text
//!  RX→TX  0x0050  header   ((payload len + 1) << 4) | 0x08
//!         0x0051  command
//!         0x0052  payload  0..=4 bytes
//!
//!  TX→RX  0x0058  command  zero while nothing was received
//!         0x0059  payload  4 bytes
//! ```
//!
//! A transmitter acknowledge raises [`IntFlags::TX_ACK`], a message from the
//! transmitter raises [`IntFlags::TX_DATA_RECEIVED`]. Both are latched by
//! the interrupt path and consumed by the exchange methods in [`engine`].
//!
//! [`IntFlags::TX_ACK`]: crate::registers::IntFlags::TX_ACK
//! [`IntFlags::TX_DATA_RECEIVED`]: crate::registers::IntFlags::TX_DATA_RECEIVED

pub mod engine;

use heapless::Vec;

use crate::{
    registers::{RX_TO_TX_DATA_LEN, TX_TO_RX_DATA_LEN},
    Error,
};

/// Command bytes of the message channel
///
/// Multi-packet transfers (serial number, certification) use consecutive
/// command bytes starting at the listed one, see [`MessageCommand::chunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageCommand {
    /// Query the transmitter firmware version
    GetTxVersion = 0x05,
    /// Report the battery temperature
    SendBatteryTemperature = 0x0A,
    /// Query the adapter type behind the transmitter
    GetTxAdapterType = 0x0B,
    /// Report the battery capacity
    SendBatteryCapacity = 0x0C,
    /// Report that the receiver output was boosted
    RxBoostSuccess = 0x0E,
    /// Report that the receiver LDO is ready
    SendReady = 0x0F,
    /// Transmitter sets the input current limit, echoed once applied
    SetCurrentLimit = 0x12,
    /// Start of a sample window, carries the output voltage
    StartSample = 0x1D,
    /// End of a sample window, carries the output current
    StopSample = 0x1E,
    /// Certification accepted
    CertificationSucceeded = 0x1F,
    /// Certification rejected
    CertificationFailed = 0x20,
    /// Serial number, four packets
    SendSerialNumber = 0x30,
    /// Certification challenge, two packets
    StartCertification = 0x36,
    /// Certification response, two packets
    GetHash = 0x38,
    /// Query the transmitter ID
    GetTxId = 0x3B,
    /// Query the transmitter capability
    GetTxCapability = 0x41,
    /// Report the charge state
    SendChargeState = 0x43,
    /// Pin the operating frequency
    FixTxFrequency = 0x44,
    /// Release the operating frequency
    UnfixTxFrequency = 0x45,
}

impl MessageCommand {
    const ALL: [MessageCommand; 19] = [
        MessageCommand::GetTxVersion,
        MessageCommand::SendBatteryTemperature,
        MessageCommand::GetTxAdapterType,
        MessageCommand::SendBatteryCapacity,
        MessageCommand::RxBoostSuccess,
        MessageCommand::SendReady,
        MessageCommand::SetCurrentLimit,
        MessageCommand::StartSample,
        MessageCommand::StopSample,
        MessageCommand::CertificationSucceeded,
        MessageCommand::CertificationFailed,
        MessageCommand::SendSerialNumber,
        MessageCommand::StartCertification,
        MessageCommand::GetHash,
        MessageCommand::GetTxId,
        MessageCommand::GetTxCapability,
        MessageCommand::SendChargeState,
        MessageCommand::FixTxFrequency,
        MessageCommand::UnfixTxFrequency,
    ];

    /// Returns the command byte.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Returns the command byte of packet `index` of a multi-packet transfer.
    pub const fn chunk(self, index: u8) -> u8 {
        self.code().wrapping_add(index)
    }
}

impl TryFrom<u8> for MessageCommand {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|command| command.code() == code)
            .ok_or(Error::InvalidData)
    }
}

/// A single packet of the message channel
///
/// The same type describes RX→TX packets, which carry a payload of
/// 0..=4 bytes, and TX→RX packets, which always carry the 4 bytes of the
/// receive window.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    command: u8,
    payload: Vec<u8, RX_TO_TX_DATA_LEN>,
}

impl Frame {
    /// Largest payload of a single packet.
    pub const MAX_PAYLOAD: usize = RX_TO_TX_DATA_LEN;

    const HEADER_MARKER: u8 = 0x08;

    /// Builds a packet.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `payload` is longer than [`Self::MAX_PAYLOAD`]
    pub fn new(command: u8, payload: &[u8]) -> Result<Self, Error> {
        let payload = Vec::from_slice(payload).map_err(|_| Error::OutOfRange)?;
        Ok(Self { command, payload })
    }

    /// Command byte.
    pub fn command(&self) -> u8 {
        self.command
    }

    /// Payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// RX→TX header byte announcing this packet.
    pub fn header(&self) -> u8 {
        ((self.payload.len() as u8 + 1) << 4) | Self::HEADER_MARKER
    }

    /// Payload length announced by an RX→TX header byte.
    ///
    /// Returns `None` for bytes that are not a valid header.
    pub fn payload_len(header: u8) -> Option<usize> {
        if header & 0x0F != Self::HEADER_MARKER {
            return None;
        }
        match (header >> 4) as usize {
            0 => None,
            len if len - 1 <= Self::MAX_PAYLOAD => Some(len - 1),
            _ => None,
        }
    }

    /// Decodes the TX→RX window.
    ///
    /// # Errors
    /// * `Error::NoData` - The command byte is zero, nothing was received
    pub fn decode(window: &[u8; TX_TO_RX_DATA_LEN]) -> Result<Self, Error> {
        let (command, payload) = (window[0], &window[1..]);
        if command == 0 {
            return Err(Error::NoData);
        }
        Self::new(command, payload)
    }

    /// Fails with `Error::UnexpectedCommand` unless this packet answers
    /// `expected`.
    pub fn expect(self, expected: u8) -> Result<Self, Error> {
        if self.command != expected {
            warn!(
                "unexpected command {:#x}, expected {:#x}",
                self.command, expected
            );
            return Err(Error::UnexpectedCommand {
                expected,
                actual: self.command,
            });
        }
        Ok(self)
    }
}
