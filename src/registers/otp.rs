//! OTP and SRAM programming registers
//!
//! These registers live in the memory map of the chip's M0 core and are only
//! meaningful while programming or reading back firmware. Writing any of them
//! during normal operation will stop the receiver.
//!
//! # Important Notes
//! - [`OTP_KEY_ADDR`] must be written with [`OTP_KEY_VALUE`] before any other
//!   register of this module is accepted
//! - The staging packet at [`OTP_SRAM_ADDR`] is consumed by the bootloader
//!   loaded at [`BOOTLOADER_ADDR`], not by the OTP firmware

/// Size of one OTP programming or SRAM transfer page.
pub const PAGE_SIZE: usize = 128;

/// Core access key register.
pub const OTP_KEY_ADDR: u16 = 0x3000;
/// Value unlocking the core registers.
pub const OTP_KEY_VALUE: u8 = 0x5A;

/// M0 core control register.
pub const M0_CTRL_ADDR: u16 = 0x3040;
/// Halts M0 execution.
pub const M0_HALT: u8 = 0x10;
/// Resets the M0, which then runs whatever is mapped at address zero.
pub const M0_RESET: u8 = 0x80;
/// Holds the M0 in reset for OTP read access.
pub const M0_HOLD: u8 = 0x11;

/// Memory map control register.
pub const MAP_ADDR: u16 = 0x3048;
/// Maps SRAM over the OTP address range.
pub const MAP_RAM_TO_OTP: u8 = 0x80;
/// Removes any remapping.
pub const MAP_NONE: u8 = 0x00;

/// PWM control register.
pub const PWM_CTRL_ADDR: u16 = 0x3C00;
/// Turns the rectifier PWM off.
pub const PWM_DISABLE: u8 = 0x80;

/// OTP read voltage regulator register.
pub const OTP_VRR_ADDR: u16 = 0x5C04;
/// Regulator setting for 3.0 V OTP reads.
pub const OTP_VRR_3V: u8 = 0x04;

/// OTP control register.
pub const OTP_CTRL_ADDR: u16 = 0x5C00;
/// Enables the OTP and its read regulator.
pub const OTP_CTRL_VRR_EN: u8 = 0x11;

/// Window through which OTP content is read while the M0 is held.
pub const OTP_READ_ADDR: u16 = 0x8000;

/// SRAM load address of the OTP bootloader.
pub const BOOTLOADER_ADDR: u16 = 0x1C00;

/// SRAM staging packet consumed by the bootloader.
///
/// Layout: status, reserved, start address (LE), code length (LE),
/// checksum (LE), followed by up to [`PAGE_SIZE`] bytes of code.
pub const OTP_SRAM_ADDR: u16 = 0x0400;
/// Size of the staging packet header.
pub const OTP_PACKET_HEADER_LEN: usize = 8;
/// Status value starting the write of the staged packet.
pub const OTP_START_WRITE: u8 = 0x01;
/// Status value while the bootloader still holds the packet.
pub const OTP_BUFFER_VALID: u8 = 0x01;
/// Status value after the packet landed in OTP.
pub const OTP_FINISH_OK: u8 = 0x02;

/// SRAM window receiving live firmware patches.
pub const SRAM_UPDATE_ADDR: u16 = 0x0600;
