//! Board configuration
//!
//! Everything the driver needs to know about the board it runs on:
//! - Foreign object detection tables for the 5 V and 9 V output modes
//! - The signal strength above which a power-on counts as well coupled
//! - Chip init tuning values
//! - The firmware images used for OTP programming and SRAM patching
//!
//! # Example
//! ```
//! use idtp9221::{Config, FodCoefficients};
//!
//! let fod_9v: FodCoefficients = "140 100 128 70 128 70 128 70".parse().unwrap();
//! let config = Config {
//!     fod_9v,
//!     signal_strength_good: 120,
//!     ..Config::default()
//! };
//! assert_eq!(config.fod_9v.to_string(), "140 100 128 70 128 70 128 70");
//! ```

use core::{fmt, str::FromStr};

use crate::{firmware::SramPatch, Error};

/// Number of words in a FOD coefficient table.
pub const FOD_COEF_LEN: usize = 8;

/// Foreign object detection coefficient table
///
/// Eight gain/offset words written to the chip starting at
/// [`FOD_COEF_ADDR`](crate::registers::FOD_COEF_ADDR).
///
/// The text form is a list of decimal values separated by spaces or commas,
/// as exchanged with the power management layer. Values beyond the eighth
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FodCoefficients(pub [u16; FOD_COEF_LEN]);

impl FromStr for FodCoefficients {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut table = [0u16; FOD_COEF_LEN];
        let mut tokens = s
            .split(|c: char| c == ' ' || c == ',')
            .filter(|token| !token.is_empty());

        for slot in table.iter_mut() {
            let token = tokens.next().ok_or(Error::InvalidData)?;
            *slot = token.trim().parse().map_err(|_| Error::InvalidData)?;
        }

        Ok(Self(table))
    }
}

impl fmt::Display for FodCoefficients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", value)?;
        }
        Ok(())
    }
}

/// Values written by a full chip init
///
/// The defaults match the reference board. The Vrect correction values shape
/// the rectifier target curve, see the P9221 datasheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitSettings {
    /// Fast charge watchdog timeout in ms
    pub fast_charge_timeout_ms: u16,
    /// Vrect correction knee
    pub power_knee: u8,
    /// Vrect correction factor
    pub vr_correction_factor: u8,
    /// Upper Vrect correction in mV
    pub vr_max_correction: u16,
    /// Lower Vrect correction in mV
    pub vr_min_correction: u16,
    /// User flags, the default enables the output capacitor
    pub user_flags: u8,
}

impl Default for InitSettings {
    fn default() -> Self {
        Self {
            fast_charge_timeout_ms: 1000,
            power_knee: 0x12,
            vr_correction_factor: 0x10,
            vr_max_correction: 0x00E6,
            vr_min_correction: 0x0064,
            user_flags: 0x01,
        }
    }
}

/// Firmware images shipped with the board support
#[derive(Debug, Clone, Copy, Default)]
pub struct FirmwareSet {
    /// Bootloader streamed into SRAM before OTP programming
    pub bootloader: &'static [u8],
    /// OTP image, programmed from OTP address zero
    pub otp: &'static [u8],
    /// SRAM patches, the first one matching the OTP version is applied
    pub patches: &'static [SramPatch],
}

/// Driver configuration
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// FOD table for 5 V output
    pub fod_5v: FodCoefficients,
    /// FOD table for 9 V output
    pub fod_9v: FodCoefficients,
    /// A power-on with a signal strength strictly above this is reported as
    /// well coupled. 255 disables the report.
    pub signal_strength_good: u8,
    /// Factory builds finish the transmitter ID exchange with the LDO ready
    /// handshake
    pub factory_mode: bool,
    /// Chip init tuning
    pub init: InitSettings,
    /// Firmware images
    pub firmware: FirmwareSet,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fod_5v: FodCoefficients::default(),
            fod_9v: FodCoefficients::default(),
            signal_strength_good: u8::MAX,
            factory_mode: false,
            init: InitSettings::default(),
            firmware: FirmwareSet::default(),
        }
    }
}
