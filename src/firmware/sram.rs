//! SRAM patching
//!
//! Fixes for firmware already burnt into OTP are shipped as patches that
//! run from SRAM. A patch is loaded while the chip runs from OTP and has a
//! transmitter, then execution is switched over. The patch is lost on the
//! next power cycle, so [`Idtp9221::check_firmware_update`] is meant to run
//! on every power up.

use embedded_hal::{delay::DelayNs, i2c::I2c};

use super::page_addr;
use crate::{
    chip::ChipInit,
    receiver::{Idtp9221, Platform},
    registers::{
        Command, Command1, CommandFlags, ModeFlags, COMMAND1_UNLOCK_SWITCH, PAGE_SIZE,
        SRAM_UPDATE_ADDR,
    },
    Error,
};

/// Interval between two mode polls after the switch to SRAM.
pub const SRAM_SWITCH_POLL_MS: u32 = 50;
/// Mode polls before the switch to SRAM is considered failed.
pub const SRAM_SWITCH_POLLS: usize = 3;

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// Loads `image` into SRAM and switches execution to it.
    ///
    /// Each page is read back right after it was written. A mismatch stops
    /// the update before the next page and before the switch.
    ///
    /// # Errors
    /// * `Error::WrongMode` - Not running from OTP, or no WPC/PMA link
    /// * `Error::Verify` - A page did not read back as written
    /// * `Error::Timeout` - The chip did not report SRAM execution
    /// * `Error::Bus` - A register access failed
    pub fn program_sram_update(&self, image: &[u8]) -> Result<(), Error> {
        let mode = self.get_mode()?;
        if !mode.flags.contains(ModeFlags::OTP_ONLY) {
            error!("sram update: not running from otp, mode {:#x}", mode.flags.bits());
            return Err(Error::WrongMode);
        }
        if !mode.tx_present() {
            error!("sram update: no wpc/pma link, mode {:#x}", mode.flags.bits());
            return Err(Error::WrongMode);
        }

        let mut readback = [0u8; PAGE_SIZE];
        for (i, page) in image.chunks(PAGE_SIZE).enumerate() {
            let addr = page_addr(SRAM_UPDATE_ADDR, i)?;
            let readback = &mut readback[..page.len()];

            self.device.write_block(addr, page)?;
            self.device.read_block(addr, readback)?;
            if *readback != *page {
                error!("sram page {:#x} does not read back", addr);
                return Err(Error::Verify);
            }
        }
        debug!("sram patch loaded, {} bytes", image.len());

        self.device.write_register(Command1 {
            value: COMMAND1_UNLOCK_SWITCH,
        })?;
        self.device
            .write_register(Command::new(CommandFlags::SWITCH_TO_SRAM))?;

        for _ in 0..SRAM_SWITCH_POLLS {
            self.device.sleep_ms(SRAM_SWITCH_POLL_MS);
            if self.get_mode()?.flags.contains(ModeFlags::RAM_PROGRAM) {
                info!("running from sram");
                return Ok(());
            }
        }

        error!("switch to sram failed");
        Err(Error::Timeout)
    }

    /// Applies the first configured patch matching the OTP firmware version,
    /// then re-runs the full chip init.
    ///
    /// Returns whether a patch was applied.
    pub fn check_firmware_update(&self) -> Result<bool, Error> {
        let version = self.get_rx_fw_version()?;

        let Some(patch) = self
            .config
            .firmware
            .patches
            .iter()
            .find(|patch| patch.applies_to(version))
        else {
            debug!("no sram patch for otp version");
            return Ok(false);
        };

        info!("applying sram patch, {} bytes", patch.image.len());
        self.program_sram_update(patch.image)?;
        self.chip_init(ChipInit::Full)?;
        Ok(true)
    }
}
