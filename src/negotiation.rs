//! Transmitter negotiation and reporting
//!
//! Everything the receiver asks from or tells the transmitter over the
//! message channel: certification, discovery of the transmitter's type and
//! capability, frequency pinning, the transmitter ID, and the periodic
//! reports the charging orchestration sends back.
//!
//! Queries check the command byte echoed in the answer and fail with
//! `Error::UnexpectedCommand` on a mismatch. The certification response is
//! the exception, see [`Idtp9221::certify`].

use bitflags::bitflags;
use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::{
    firmware::FirmwareVersion,
    protocol::MessageCommand,
    receiver::{Idtp9221, Platform},
    registers::{LdoStatus, RX_TO_TX_DATA_LEN},
    Error,
};

/// Length of the certification challenge.
pub const CERT_RANDOM_LEN: usize = 8;
/// Length of the certification response.
pub const CERT_KEY_LEN: usize = 8;
/// Length of the serial number report.
pub const SERIAL_NUMBER_LEN: usize = 16;
/// Parameters of the transmitter ID query.
pub const TX_ID_PARAMS: [u8; 2] = [0x88, 0x66];

/// Lowest pinned operating frequency in kHz.
pub const FIXED_FOP_MIN_KHZ: u16 = 120;
/// Highest pinned operating frequency in kHz.
pub const FIXED_FOP_MAX_KHZ: u16 = 148;

/// Highest battery temperature reported as is, in °C.
pub const BATT_TEMP_MAX: i32 = 127;

const TX_CAP_VOUT_STEP_MV: u32 = 100;
const TX_CAP_IOUT_STEP_MA: u32 = 100;

/// Adapter type reported by the transmitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdapterType(pub u8);

bitflags! {
    /// Optional transmitter features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TxCapabilityFlags: u8 {
        /// Output voltage can be boosted above 5 V
        const BOOST = 0x01;
        /// The transmitter is cable powered
        const CABLE = 0x02;
        /// The transmitter has a fan
        const FAN = 0x04;
        /// The transmitter has a thermoelectric cooler
        const TEC = 0x08;
    }
}

/// Transmitter capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxCapability {
    /// Adapter type behind the transmitter
    pub adapter_type: AdapterType,
    /// Highest output voltage in mV
    pub vout_max_mv: u32,
    /// Highest output current in mA
    pub iout_max_ma: u32,
    /// Optional features
    pub flags: TxCapabilityFlags,
}

impl TxCapability {
    /// Decodes the answer to a capability query, `[type, vout, iout, attr]`.
    pub fn from_payload(payload: &[u8]) -> Result<Self, Error> {
        let [adapter_type, vout, iout, attr] = *payload else {
            return Err(Error::InvalidData);
        };

        Ok(Self {
            adapter_type: AdapterType(adapter_type),
            vout_max_mv: u32::from(vout) * TX_CAP_VOUT_STEP_MV,
            iout_max_ma: u32::from(iout) * TX_CAP_IOUT_STEP_MA,
            flags: TxCapabilityFlags::from_bits_retain(attr),
        })
    }

    pub fn boost(&self) -> bool {
        self.flags.contains(TxCapabilityFlags::BOOST)
    }

    pub fn cable(&self) -> bool {
        self.flags.contains(TxCapabilityFlags::CABLE)
    }

    pub fn fan(&self) -> bool {
        self.flags.contains(TxCapabilityFlags::FAN)
    }

    pub fn tec(&self) -> bool {
        self.flags.contains(TxCapabilityFlags::TEC)
    }
}

/// Outcome of checking the certification response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CertificationResult {
    Succeeded,
    Failed,
}

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// Runs the certification exchange.
    ///
    /// The challenge is sent in two acknowledged packets. The response is
    /// fetched in two queries; a packet whose echoed command does not match
    /// its query is skipped and its part of the key stays zero. Checking the
    /// key is up to the caller.
    ///
    /// # Errors
    /// * `Error::NoAck` / `Error::Stopped` - Sending the challenge failed
    /// * Any query error while fetching the response
    pub fn certify(&self, random: &[u8; CERT_RANDOM_LEN]) -> Result<[u8; CERT_KEY_LEN], Error> {
        for (i, chunk) in random.chunks(RX_TO_TX_DATA_LEN).enumerate() {
            self.send_with_ack(MessageCommand::StartCertification.chunk(i as u8), chunk)
                .inspect_err(|_| {
                    error!("sending certification challenge failed");
                })?;
            debug!("challenge packet {} sent", i);
        }

        let mut key = [0u8; CERT_KEY_LEN];
        for (i, slot) in key.chunks_mut(RX_TO_TX_DATA_LEN).enumerate() {
            let command = MessageCommand::GetHash.chunk(i as u8);
            let frame = self.get_tx_parameter(command)?;
            match frame.expect(command) {
                Ok(frame) => slot.copy_from_slice(frame.payload()),
                Err(_) => {
                    warn!("certification response packet {} skipped", i);
                }
            }
        }

        Ok(key)
    }

    /// Queries the adapter type behind the transmitter.
    pub fn get_tx_type(&self) -> Result<AdapterType, Error> {
        let command = MessageCommand::GetTxAdapterType.code();
        let frame = self.get_tx_parameter(command)?.expect(command)?;
        info!("tx adapter type {}", frame.payload()[0]);
        Ok(AdapterType(frame.payload()[0]))
    }

    /// Queries the transmitter capability.
    pub fn get_tx_capability(&self) -> Result<TxCapability, Error> {
        let command = MessageCommand::GetTxCapability.code();
        let frame = self.get_tx_parameter(command)?.expect(command)?;
        let capability = TxCapability::from_payload(frame.payload())?;
        info!(
            "tx capability: vout max {} mV, iout max {} mA, flags {:#x}",
            capability.vout_max_mv,
            capability.iout_max_ma,
            capability.flags.bits()
        );
        Ok(capability)
    }

    /// Queries the transmitter firmware version.
    pub fn get_tx_fw_version(&self) -> Result<FirmwareVersion, Error> {
        let command = MessageCommand::GetTxVersion.code();
        let frame = self.get_tx_parameter(command)?.expect(command)?;
        let bytes: [u8; 4] = frame.payload().try_into().map_err(|_| Error::InvalidData)?;
        Ok(FirmwareVersion::from_le_bytes(bytes))
    }

    /// Pins the transmitter operating frequency.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `khz` outside 120..=148, nothing was sent
    pub fn fix_frequency(&self, khz: u16) -> Result<(), Error> {
        if !(FIXED_FOP_MIN_KHZ..=FIXED_FOP_MAX_KHZ).contains(&khz) {
            error!("fixed frequency {} kHz out of range", khz);
            return Err(Error::OutOfRange);
        }
        self.send_with_ack(MessageCommand::FixTxFrequency.code(), &[khz as u8])
    }

    /// Lets the transmitter choose its operating frequency again.
    pub fn unfix_frequency(&self) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::UnfixTxFrequency.code(), &[])
    }

    /// Queries the transmitter ID.
    ///
    /// Factory builds follow up with the LDO ready handshake. Its failure is
    /// logged and does not fail the query.
    pub fn get_tx_id(&self) -> Result<u16, Error> {
        let command = MessageCommand::GetTxId.code();
        let frame = self.query(command, &TX_ID_PARAMS)?.expect(command)?;
        let id = u16::from_be_bytes([frame.payload()[0], frame.payload()[1]]);
        info!("tx id {:#x}", id);

        if self.config.factory_mode && self.ldo_ready().is_err() {
            warn!("ldo ready handshake failed");
        }

        Ok(id)
    }

    /// Tells the transmitter the LDO is ready and clears the chip's
    /// handshake status.
    pub fn ldo_ready(&self) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::SendReady.code(), &[])?;

        let before: LdoStatus = self.device.read_register()?;
        self.device.write_register(LdoStatus { value: 0 })?;
        let after: LdoStatus = self.device.read_register()?;
        debug!("ldo status {:#x} -> {:#x}", before.value, after.value);

        Ok(())
    }

    /// Reports the charge state.
    pub fn send_charge_state(&self, state: u8) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::SendChargeState.code(), &[state])
    }

    /// Reports the output voltage in mV, opening a sample window.
    pub fn send_rx_vout(&self, mv: u16) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::StartSample.code(), &mv.to_le_bytes())
    }

    /// Reports the output current in mA, closing a sample window.
    pub fn send_rx_iout(&self, ma: u16) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::StopSample.code(), &ma.to_le_bytes())
    }

    /// Reports the serial number in four acknowledged packets.
    pub fn send_serial_number(&self, serial: &[u8; SERIAL_NUMBER_LEN]) -> Result<(), Error> {
        for (i, chunk) in serial.chunks(RX_TO_TX_DATA_LEN).enumerate() {
            self.send_with_ack(MessageCommand::SendSerialNumber.chunk(i as u8), chunk)?;
        }
        Ok(())
    }

    /// Reports the battery temperature in °C. Values outside 1..=127 are
    /// reported as zero.
    pub fn send_battery_temperature(&self, celsius: i32) -> Result<(), Error> {
        let value = if (1..=BATT_TEMP_MAX).contains(&celsius) {
            celsius as u8
        } else {
            0
        };
        self.send_with_ack(MessageCommand::SendBatteryTemperature.code(), &[value])
    }

    /// Reports the battery capacity in percent.
    pub fn send_battery_capacity(&self, percent: u8) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::SendBatteryCapacity.code(), &[percent])
    }

    /// Reports the outcome of the certification check.
    pub fn send_certification_result(&self, result: CertificationResult) -> Result<(), Error> {
        let command = match result {
            CertificationResult::Succeeded => MessageCommand::CertificationSucceeded,
            CertificationResult::Failed => MessageCommand::CertificationFailed,
        };
        self.send_with_ack(command.code(), &[])
    }

    /// Reports that the output was boosted.
    pub fn send_rx_boost_success(&self) -> Result<(), Error> {
        self.send_with_ack(MessageCommand::RxBoostSuccess.code(), &[])
    }
}
