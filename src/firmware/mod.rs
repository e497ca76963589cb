//! Receiver firmware management
//!
//! The P9221 runs from one-time-programmable memory. Fresh parts are
//! programmed once through a bootloader (see [`otp`]); field fixes are
//! applied at runtime by loading a patch into SRAM and switching execution
//! to it (see [`sram`]).
//!
//! Patches are selected by the version programmed into OTP. Versions are
//! kept most significant byte first so that their natural ordering is the
//! version ordering.

pub mod otp;
pub mod sram;

use core::fmt;

use crate::{
    registers::{OtpFirmwareVersion, PAGE_SIZE},
    Error,
};

/// Address of page `index` of a region starting at `base`.
pub(crate) fn page_addr(base: u16, index: usize) -> Result<u16, Error> {
    index
        .checked_mul(PAGE_SIZE)
        .and_then(|offset| u16::try_from(offset).ok())
        .and_then(|offset| base.checked_add(offset))
        .ok_or(Error::OutOfRange)
}

/// Firmware version, most significant byte first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FirmwareVersion(pub [u8; 4]);

impl FirmwareVersion {
    /// Builds a version from bytes in wire order, least significant first.
    pub const fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self([bytes[3], bytes[2], bytes[1], bytes[0]])
    }
}

impl From<OtpFirmwareVersion> for FirmwareVersion {
    fn from(register: OtpFirmwareVersion) -> Self {
        Self::from_le_bytes(register.bytes)
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "0x{:02x} 0x{:02x} 0x{:02x} 0x{:02x}", a, b, c, d)
    }
}

/// SRAM patch for a range of OTP firmware versions
#[derive(Debug, Clone, Copy)]
pub struct SramPatch {
    /// Oldest OTP version the patch applies to
    pub from: FirmwareVersion,
    /// Newest OTP version the patch applies to
    pub to: FirmwareVersion,
    /// Patch image loaded at [`SRAM_UPDATE_ADDR`](crate::registers::SRAM_UPDATE_ADDR)
    pub image: &'static [u8],
}

impl SramPatch {
    /// Whether `version` lies in the inclusive range of this patch.
    pub fn applies_to(&self, version: FirmwareVersion) -> bool {
        (self.from..=self.to).contains(&version)
    }
}
