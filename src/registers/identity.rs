//! Identification registers

use core::convert::Infallible;

use regiface::{register, FromByteArray, ReadableRegister};

/// Chip ID register (address: 0x0000)
///
/// Reads 0x9221 on the P9221.
#[register(0x0000u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChipId {
    /// Raw ID bytes in register order
    pub bytes: [u8; 2],
}

impl ChipId {
    /// Returns the chip ID as a number.
    pub fn value(&self) -> u16 {
        u16::from_le_bytes(self.bytes)
    }
}

impl core::fmt::Display for ChipId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#x} {:#x}", self.bytes[0], self.bytes[1])
    }
}

/// OTP firmware version register (address: 0x0004)
///
/// Four bytes, least significant first.
#[register(0x0004u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ReadableRegister)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OtpFirmwareVersion {
    /// Raw version bytes in register order
    pub bytes: [u8; 4],
}

impl FromByteArray for ChipId {
    type Error = Infallible;
    type Array = [u8; 2];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { bytes })
    }
}

impl FromByteArray for OtpFirmwareVersion {
    type Error = Infallible;
    type Array = [u8; 4];

    fn from_bytes(bytes: Self::Array) -> Result<Self, Self::Error> {
        Ok(Self { bytes })
    }
}
