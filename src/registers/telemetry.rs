//! Telemetry and output control registers
//!
//! ADC readings are 12-bit values in little-endian 16-bit registers, see
//! [`crate::chip`] for the scaling into physical units.

use core::convert::Infallible;

use regiface::{FromByteArray, ReadableRegister, ToByteArray, WritableRegister};

/// Base address of the foreign object detection coefficient table.
///
/// The table holds [`FOD_COEF_LEN`](crate::FOD_COEF_LEN) little-endian words.
pub const FOD_COEF_ADDR: u16 = 0x0068;

value_register! {
    /// Output voltage ADC reading (address: 0x003C)
    OutputVoltage: u16 = 0x003Cu16
}

value_register! {
    /// Output LDO voltage setpoint (address: 0x003E)
    ///
    /// `value = (mV - 3500) / 100`
    OutputVoltageSet: u8 = 0x003Eu16
}

value_register! {
    /// Rectifier voltage ADC reading (address: 0x0040)
    RectifiedVoltage: u16 = 0x0040u16
}

value_register! {
    /// Output current reading in mA (address: 0x0044)
    OutputCurrent: u16 = 0x0044u16
}

value_register! {
    /// Received signal strength (address: 0x0046)
    SignalStrength: u8 = 0x0046u16
}

value_register! {
    /// Operating frequency period count (address: 0x0048)
    OperatingFrequency: u16 = 0x0048u16
}

value_register! {
    /// Transmitter output voltage request in mV (address: 0x0078)
    ///
    /// Sent to the transmitter with the fast-charge command.
    TxOutputVoltageSet: u16 = 0x0078u16
}

value_register! {
    /// Fast charge watchdog timeout in ms (address: 0x0084)
    FastChargeTimeout: u16 = 0x0084u16
}

value_register! {
    /// Fast charge watchdog counter (address: 0x0086)
    ///
    /// Writing zero kicks the watchdog.
    FastChargeTimer: u16 = 0x0086u16
}

value_register! {
    /// Rectifier voltage correction knee (address: 0x00D0)
    PowerKnee: u8 = 0x00D0u16
}

value_register! {
    /// Rectifier voltage correction factor (address: 0x00D1)
    VrCorrectionFactor: u8 = 0x00D1u16
}

value_register! {
    /// Upper rectifier voltage correction in mV (address: 0x00D2)
    VrMaxCorrection: u16 = 0x00D2u16
}

value_register! {
    /// Lower rectifier voltage correction in mV (address: 0x00D4)
    VrMinCorrection: u16 = 0x00D4u16
}

value_register! {
    /// User feature flags (address: 0x00D6)
    UserFlags: u8 = 0x00D6u16
}
