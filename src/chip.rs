//! Low-level chip operations
//!
//! Telemetry, output voltage control, control lines, interrupt mask
//! handling and chip configuration. Nothing here talks to the transmitter
//! through the message channel; see [`crate::protocol`] for that.
//!
//! # Telemetry scaling
//! | Reading | Register | Scaling |
//! |---------|----------|---------|
//! | Vrect   | 0x0040   | `raw * 21000 / 4095` mV |
//! | Vout    | 0x003C   | `raw * 12600 / 4095` mV |
//! | Iout    | 0x0044   | raw mA |
//! | Fop     | 0x0048   | `384000 / raw` kHz |

use core::sync::atomic::Ordering;

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::{
    config::FodCoefficients,
    firmware::FirmwareVersion,
    receiver::{Idtp9221, Platform},
    registers::{
        ChipId, Command, CommandFlags, EptReason, FastChargeTimeout, FastChargeTimer, IntFlags,
        InterruptClear, InterruptEnable, OperatingFrequency, OtpFirmwareVersion, OutputCurrent,
        OutputVoltage, OutputVoltageSet, PowerKnee, RectifiedVoltage, SignalStrength, SystemMode,
        TxOutputVoltageSet, UserFlags, VrCorrectionFactor, VrMaxCorrection, VrMinCorrection,
        FOD_COEF_ADDR,
    },
    Error, FOD_COEF_LEN,
};

/// Full scale of the Vrect ADC in mV.
pub const VRECT_FULL_SCALE_MV: u32 = 21000;
/// Full scale of the Vout ADC in mV.
pub const VOUT_FULL_SCALE_MV: u32 = 12600;
/// ADC full scale code.
pub const ADC_FULL_SCALE: u32 = 4095;
/// Operating frequency coefficient, `kHz = FOP_COEF / raw`.
pub const FOP_COEF: u32 = 384000;

/// Lowest receiver output voltage in mV.
pub const RX_VOUT_MIN_MV: u32 = 3500;
/// Highest receiver output voltage in mV.
pub const RX_VOUT_MAX_MV: u32 = 12500;
/// Receiver output voltage step in mV.
pub const RX_VOUT_STEP_MV: u32 = 100;

/// Lowest transmitter output voltage in mV.
pub const TX_VOUT_MIN_MV: u32 = 3500;
/// Highest transmitter output voltage in mV.
pub const TX_VOUT_MAX_MV: u32 = 20000;
/// Accepted deviation of the output voltage from the requested one, in mV.
pub const TX_VOUT_TOLERANCE_MV: u32 = 500;
/// Time budget for the transmitter to reach a new output voltage.
pub const TX_VOUT_TIMEOUT_MS: u32 = 1500;
/// Output voltage poll interval while ramping.
pub const TX_VOUT_POLL_MS: u32 = 50;

/// What [`Idtp9221::chip_init`] configures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipInit {
    /// Watchdog, Vrect correction and user flags, then the 5 V FOD table
    Full,
    /// Only the 5 V FOD table
    Fod5V,
    /// Only the 9 V FOD table
    Fod9V,
}

/// End-power-transfer reasons, as defined by the Qi specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EndPowerTransfer {
    Unknown = 0x00,
    ChargeComplete = 0x01,
    InternalFault = 0x02,
    OverTemperature = 0x03,
    OverVoltage = 0x04,
    OverCurrent = 0x05,
    BatteryFailure = 0x06,
    NoResponse = 0x08,
    NegotiationFailure = 0x0A,
    Restart = 0x0B,
}

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// Rectifier voltage in mV.
    pub fn get_rx_vrect(&self) -> Result<u32, Error> {
        let raw: RectifiedVoltage = self.device.read_register()?;
        Ok(u32::from(raw.value) * VRECT_FULL_SCALE_MV / ADC_FULL_SCALE)
    }

    /// Output voltage in mV.
    pub fn get_rx_vout(&self) -> Result<u32, Error> {
        let raw: OutputVoltage = self.device.read_register()?;
        Ok(u32::from(raw.value) * VOUT_FULL_SCALE_MV / ADC_FULL_SCALE)
    }

    /// Output current in mA.
    pub fn get_rx_iout(&self) -> Result<u32, Error> {
        let raw: OutputCurrent = self.device.read_register()?;
        Ok(u32::from(raw.value))
    }

    /// Operating frequency in kHz.
    ///
    /// # Errors
    /// * `Error::InvalidData` - The chip reported a zero period
    pub fn get_rx_fop(&self) -> Result<u32, Error> {
        let raw: OperatingFrequency = self.device.read_register()?;
        FOP_COEF
            .checked_div(u32::from(raw.value))
            .ok_or(Error::InvalidData)
    }

    /// Received signal strength.
    pub fn get_signal_strength(&self) -> Result<u8, Error> {
        let raw: SignalStrength = self.device.read_register()?;
        Ok(raw.value)
    }

    /// Sets the output LDO voltage.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `mv` outside 3500..=12500, nothing was written
    pub fn set_rx_vout(&self, mv: u32) -> Result<(), Error> {
        if !(RX_VOUT_MIN_MV..=RX_VOUT_MAX_MV).contains(&mv) {
            error!("rx vout {} mV out of range", mv);
            return Err(Error::OutOfRange);
        }

        let value = (mv / RX_VOUT_STEP_MV - RX_VOUT_MIN_MV / RX_VOUT_STEP_MV) as u8;
        self.device.write_register(OutputVoltageSet { value })
    }

    /// Asks the transmitter for a new output voltage and waits until the
    /// receiver output follows.
    ///
    /// The output is sampled every [`TX_VOUT_POLL_MS`] for at most
    /// [`TX_VOUT_TIMEOUT_MS`] and accepted once it lies within
    /// [`TX_VOUT_TOLERANCE_MV`] of `mv`.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `mv` outside 3500..=20000, nothing was written
    /// * `Error::Stopped` - Charging was stopped while waiting
    /// * `Error::Timeout` - The output never reached the band
    pub fn set_tx_vout(&self, mv: u32) -> Result<(), Error> {
        if !(TX_VOUT_MIN_MV..=TX_VOUT_MAX_MV).contains(&mv) {
            error!("tx vout {} mV out of range", mv);
            return Err(Error::OutOfRange);
        }

        self.device
            .write_register(TxOutputVoltageSet { value: mv as u16 })?;
        self.device
            .write_register(Command::new(CommandFlags::FAST_CHARGE))?;

        let band = mv.saturating_sub(TX_VOUT_TOLERANCE_MV)..=mv + TX_VOUT_TOLERANCE_MV;
        for _ in 0..TX_VOUT_TIMEOUT_MS / TX_VOUT_POLL_MS {
            self.device.sleep_ms(TX_VOUT_POLL_MS);

            let vout = self.get_rx_vout()?;
            if band.contains(&vout) {
                debug!("tx vout {} mV reached, vout {} mV", mv, vout);
                return Ok(());
            }
            if self.stop_charging.load(Ordering::Acquire) {
                warn!("tx vout ramp aborted, charging stopped");
                return Err(Error::Stopped);
            }
        }

        error!("tx vout {} mV not reached", mv);
        Err(Error::Timeout)
    }

    /// Enables or disables the receiver through its active-low enable line.
    pub fn chip_enable(&self, enable: bool) {
        debug!("chip enable {}", enable);
        self.platform.set_enable_line(!enable);
    }

    /// Drives the sleep enable line. Ignored while the interrupt source is
    /// parked by the abnormal interrupt detector.
    pub fn sleep_enable(&self, enable: bool) {
        if self.irq_abnormal() {
            debug!("sleep enable {} ignored, irq abnormal", enable);
            return;
        }
        self.platform.set_sleep_enable_line(enable);
    }

    /// Reads the system mode register.
    pub fn get_mode(&self) -> Result<SystemMode, Error> {
        self.device.read_register()
    }

    /// Whether a transmitter field is present. Bus failures read as absent.
    pub fn check_tx_exist(&self) -> bool {
        match self.get_mode() {
            Ok(mode) => mode.tx_present(),
            Err(_) => {
                error!("reading system mode failed");
                false
            }
        }
    }

    /// Adds `flags` to the enabled interrupt sources.
    pub fn enable_interrupts(&self, flags: IntFlags) -> Result<(), Error> {
        let mut enable: InterruptEnable = self.device.read_register()?;
        enable.flags |= flags;
        self.device.write_register(enable)
    }

    /// Clears `flags` from the interrupt status register.
    pub fn clear_interrupts(&self, flags: IntFlags) -> Result<(), Error> {
        self.device.write_register(InterruptClear { flags })?;
        self.device
            .write_register(Command::new(CommandFlags::CLEAR_INTERRUPT))
    }

    /// Ends the power transfer, reporting `reason` to the transmitter.
    pub fn send_ept(&self, reason: EndPowerTransfer) -> Result<(), Error> {
        info!("send ept {:#x}", reason as u8);
        self.device.write_register(EptReason {
            value: reason as u8,
        })?;
        self.device
            .write_register(Command::new(CommandFlags::SEND_EPT))
    }

    /// Restarts the fast charge watchdog.
    pub fn kick_watchdog(&self) -> Result<(), Error> {
        self.device.write_register(FastChargeTimer { value: 0 })
    }

    /// Reads the chip ID.
    pub fn get_chip_id(&self) -> Result<ChipId, Error> {
        self.device.read_register()
    }

    /// Reads the version of the firmware programmed into OTP.
    pub fn get_rx_fw_version(&self) -> Result<FirmwareVersion, Error> {
        let version: OtpFirmwareVersion = self.device.read_register()?;
        Ok(version.into())
    }

    /// Reads the active FOD table.
    pub fn get_fod_coefficients(&self) -> Result<FodCoefficients, Error> {
        let mut table = [0u16; FOD_COEF_LEN];
        for (i, value) in table.iter_mut().enumerate() {
            *value = self.device.read_word(FOD_COEF_ADDR + 2 * i as u16)?;
        }
        Ok(FodCoefficients(table))
    }

    /// Writes a FOD table, stopping at the first failed word.
    pub fn set_fod_coefficients(&self, table: &FodCoefficients) -> Result<(), Error> {
        for (i, value) in table.0.iter().enumerate() {
            trace!("fod[{}] = {}", i, value);
            self.device
                .write_word(FOD_COEF_ADDR + 2 * i as u16, *value)
                .inspect_err(|_| {
                    error!("writing fod[{}] failed", i);
                })?;
        }
        Ok(())
    }

    /// Configures the chip after power up or a voltage mode change.
    ///
    /// A full init writes every register of the sequence even if one of them
    /// fails and reports the failure afterwards.
    pub fn chip_init(&self, mode: ChipInit) -> Result<(), Error> {
        let fod = match mode {
            ChipInit::Full => {
                let init = &self.config.init;
                let results = [
                    self.device.write_register(FastChargeTimeout {
                        value: init.fast_charge_timeout_ms,
                    }),
                    self.device.write_register(PowerKnee {
                        value: init.power_knee,
                    }),
                    self.device.write_register(VrCorrectionFactor {
                        value: init.vr_correction_factor,
                    }),
                    self.device.write_register(VrMaxCorrection {
                        value: init.vr_max_correction,
                    }),
                    self.device.write_register(VrMinCorrection {
                        value: init.vr_min_correction,
                    }),
                    self.device.write_register(UserFlags {
                        value: init.user_flags,
                    }),
                ];
                if let Some(err) = results.into_iter().find_map(Result::err) {
                    error!("chip init register write failed");
                    let _ = self.set_fod_coefficients(&self.config.fod_5v);
                    return Err(err);
                }
                self.config.fod_5v
            }
            ChipInit::Fod5V => self.config.fod_5v,
            ChipInit::Fod9V => self.config.fod_9v,
        };

        self.set_fod_coefficients(&fod)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;

    use super::*;
    use crate::{
        registers::ModeFlags,
        testing::{Harness, Op},
        Config,
    };

    #[test]
    fn telemetry_is_scaled_to_physical_units() {
        let h = Harness::new();
        {
            let mut model = h.model.lock().unwrap();
            model.write_u16(0x0040, 4095);
            model.write_u16(0x003C, 1950);
            model.write_u16(0x0044, 812);
            model.write_u16(0x0048, 3000);
        }

        assert_eq!(h.rx.get_rx_vrect(), Ok(21000));
        assert_eq!(h.rx.get_rx_vout(), Ok(1950 * 12600 / 4095));
        assert_eq!(h.rx.get_rx_iout(), Ok(812));
        assert_eq!(h.rx.get_rx_fop(), Ok(128));
    }

    #[test]
    fn zero_frequency_period_is_rejected() {
        let h = Harness::new();
        assert_eq!(h.rx.get_rx_fop(), Err(Error::InvalidData));
    }

    #[test]
    fn telemetry_reports_bus_failure() {
        let h = Harness::new();
        h.model.lock().unwrap().fail_next(3);
        assert_eq!(h.rx.get_rx_vrect(), Err(Error::Bus));
    }

    #[test]
    fn rx_vout_is_encoded_in_100mv_steps() {
        let h = Harness::new();

        h.rx.set_rx_vout(3500).unwrap();
        assert_eq!(h.model.lock().unwrap().read_u8(0x003E), 0);
        h.rx.set_rx_vout(9000).unwrap();
        assert_eq!(h.model.lock().unwrap().read_u8(0x003E), 55);
        h.rx.set_rx_vout(12500).unwrap();
        assert_eq!(h.model.lock().unwrap().read_u8(0x003E), 90);
    }

    #[test]
    fn out_of_range_voltages_never_reach_the_bus() {
        let h = Harness::new();

        assert_eq!(h.rx.set_rx_vout(3499), Err(Error::OutOfRange));
        assert_eq!(h.rx.set_rx_vout(12501), Err(Error::OutOfRange));
        assert_eq!(h.rx.set_tx_vout(3499), Err(Error::OutOfRange));
        assert_eq!(h.rx.set_tx_vout(20001), Err(Error::OutOfRange));

        assert!(h.model.lock().unwrap().ops().is_empty());
        assert_eq!(h.delay.calls(), 0);
    }

    #[test]
    fn tx_vout_returns_once_output_is_in_band() {
        let h = Harness::new();
        h.model.lock().unwrap().track_fast_charge(true);

        assert_eq!(h.rx.set_tx_vout(9000), Ok(()));

        let model = h.model.lock().unwrap();
        assert_eq!(model.read_u16(0x0078), 9000);
        assert_eq!(model.commands(), vec![CommandFlags::FAST_CHARGE.bits()]);
        drop(model);
        assert_eq!(h.delay.recorded(), vec![TX_VOUT_POLL_MS]);
    }

    #[test]
    fn tx_vout_gives_up_after_poll_budget() {
        let h = Harness::new();
        // Output stuck at 5 V
        h.model.lock().unwrap().write_u16(0x003C, 1625);

        assert_eq!(h.rx.set_tx_vout(9000), Err(Error::Timeout));
        assert_eq!(
            h.delay.calls(),
            (TX_VOUT_TIMEOUT_MS / TX_VOUT_POLL_MS) as usize
        );
    }

    #[test]
    fn tx_vout_poll_stops_with_charging() {
        let h = Harness::new();
        let rx = h.rx;
        h.delay.set_hook(move || rx.stop_charging());

        assert_eq!(h.rx.set_tx_vout(9000), Err(Error::Stopped));
        assert_eq!(h.delay.calls(), 1);
    }

    #[test]
    fn enable_line_is_active_low() {
        let h = Harness::new();

        h.rx.chip_enable(true);
        assert!(!h.platform.enable_line());
        h.rx.chip_enable(false);
        assert!(h.platform.enable_line());
    }

    #[test]
    fn sleep_enable_is_ignored_while_irq_abnormal() {
        let h = Harness::new();

        h.rx.sleep_enable(true);
        assert!(h.platform.sleep_enable_line());

        h.rx.irq_abnormal.store(true, Ordering::Release);
        h.rx.sleep_enable(false);
        assert!(h.platform.sleep_enable_line());
    }

    #[test]
    fn tx_presence_follows_protocol_mode_bits() {
        let h = Harness::new();
        assert!(!h.rx.check_tx_exist());

        h.model.lock().unwrap().write_u8(0x004C, ModeFlags::OTP_ONLY.bits());
        assert!(!h.rx.check_tx_exist());

        h.model
            .lock()
            .unwrap()
            .write_u8(0x004C, (ModeFlags::OTP_ONLY | ModeFlags::PMA).bits());
        assert!(h.rx.check_tx_exist());

        h.model.lock().unwrap().fail_next(3);
        assert!(!h.rx.check_tx_exist());
    }

    #[test]
    fn interrupt_enable_is_read_modify_write() {
        let h = Harness::new();
        h.model.lock().unwrap().write_u16(0x0038, IntFlags::READY.bits());

        h.rx.enable_interrupts(IntFlags::TX_ACK | IntFlags::TX_DATA_RECEIVED)
            .unwrap();

        assert_eq!(
            h.model.lock().unwrap().read_u16(0x0038),
            (IntFlags::READY | IntFlags::TX_ACK | IntFlags::TX_DATA_RECEIVED).bits()
        );
    }

    #[test]
    fn clear_writes_mask_then_command() {
        let h = Harness::new();
        h.model
            .lock()
            .unwrap()
            .set_status(IntFlags::READY | IntFlags::OVER_CURRENT);

        h.rx.clear_interrupts(IntFlags::READY).unwrap();

        let model = h.model.lock().unwrap();
        assert_eq!(
            model.ops(),
            vec![
                Op::Write(0x0056, vec![0x40, 0x00]),
                Op::Write(0x004E, vec![CommandFlags::CLEAR_INTERRUPT.bits()]),
            ]
        );
        assert_eq!(model.status(), IntFlags::OVER_CURRENT);
    }

    #[test]
    fn ept_writes_reason_then_command() {
        let h = Harness::new();

        h.rx.send_ept(EndPowerTransfer::OverVoltage).unwrap();

        assert_eq!(
            h.model.lock().unwrap().ops(),
            vec![
                Op::Write(0x003B, vec![0x04]),
                Op::Write(0x004E, vec![CommandFlags::SEND_EPT.bits()]),
            ]
        );
    }

    #[test]
    fn watchdog_kick_zeroes_timer() {
        let h = Harness::new();
        h.model.lock().unwrap().write_u16(0x0086, 0x1234);

        h.rx.kick_watchdog().unwrap();

        assert_eq!(h.model.lock().unwrap().read_u16(0x0086), 0);
    }

    #[test]
    fn identity_registers_are_decoded() {
        let h = Harness::new();
        {
            let mut model = h.model.lock().unwrap();
            model.write_block(0x0000, &[0x21, 0x92]);
            model.write_block(0x0004, &[0x04, 0x03, 0x02, 0x01]);
        }

        assert_eq!(h.rx.get_chip_id().unwrap().value(), 0x9221);
        assert_eq!(
            h.rx.get_rx_fw_version(),
            Ok(FirmwareVersion([0x01, 0x02, 0x03, 0x04]))
        );
    }

    #[test]
    fn fod_table_is_stored_as_little_endian_words() {
        let h = Harness::new();
        let table = FodCoefficients([0x0102, 2, 3, 4, 5, 6, 7, 0xFFFF]);

        h.rx.set_fod_coefficients(&table).unwrap();

        let model = h.model.lock().unwrap();
        assert_eq!(model.read_block(0x0068, 2), vec![0x02, 0x01]);
        assert_eq!(model.read_u16(0x0076), 0xFFFF);
        drop(model);
        assert_eq!(h.rx.get_fod_coefficients(), Ok(table));
    }

    #[test]
    fn full_init_writes_tuning_then_5v_table() {
        let config = Config {
            fod_5v: FodCoefficients([5; FOD_COEF_LEN]),
            fod_9v: FodCoefficients([9; FOD_COEF_LEN]),
            ..Config::default()
        };
        let h = Harness::with_config(config);

        h.rx.chip_init(ChipInit::Full).unwrap();

        let init = config.init;
        let model = h.model.lock().unwrap();
        assert_eq!(model.read_u16(0x0084), init.fast_charge_timeout_ms);
        assert_eq!(model.read_u8(0x00D0), init.power_knee);
        assert_eq!(model.read_u8(0x00D1), init.vr_correction_factor);
        assert_eq!(model.read_u16(0x00D2), init.vr_max_correction);
        assert_eq!(model.read_u16(0x00D4), init.vr_min_correction);
        assert_eq!(model.read_u8(0x00D6), init.user_flags);
        assert_eq!(model.read_u16(0x0068), 5);
    }

    #[test]
    fn voltage_mode_init_only_swaps_fod_table() {
        let config = Config {
            fod_5v: FodCoefficients([5; FOD_COEF_LEN]),
            fod_9v: FodCoefficients([9; FOD_COEF_LEN]),
            ..Config::default()
        };
        let h = Harness::with_config(config);

        h.rx.chip_init(ChipInit::Fod9V).unwrap();
        assert_eq!(h.model.lock().unwrap().ops().len(), FOD_COEF_LEN);
        assert_eq!(h.rx.get_fod_coefficients(), Ok(config.fod_9v));

        h.rx.chip_init(ChipInit::Fod5V).unwrap();
        assert_eq!(h.rx.get_fod_coefficients(), Ok(config.fod_5v));
    }
}
