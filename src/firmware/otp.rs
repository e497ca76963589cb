//! OTP programming
//!
//! A blank P9221 is programmed in three phases:
//!
//! 1. The M0 core is halted, the bootloader is streamed into SRAM at
//!    [`BOOTLOADER_ADDR`] byte by byte with read-back verification, SRAM is
//!    mapped over the OTP range and the core is reset into the bootloader.
//! 2. The image is cut into [`PAGE_SIZE`] pages. Each page that is not all
//!    zero is staged as an [`OtpPacket`] at [`OTP_SRAM_ADDR`] and the
//!    bootloader is told to burn it. Its status byte is polled until the
//!    bootloader is done with the packet.
//! 3. The remapping is removed. The new firmware runs after the next power
//!    cycle.
//!
//! Programming is skipped if the start of OTP already holds data.

use embedded_hal::{delay::DelayNs, i2c::I2c};

use super::page_addr;
use crate::{
    receiver::{Idtp9221, Platform},
    registers::{
        BOOTLOADER_ADDR, M0_CTRL_ADDR, M0_HALT, M0_HOLD, M0_RESET, MAP_ADDR, MAP_NONE,
        MAP_RAM_TO_OTP, OTP_BUFFER_VALID, OTP_CTRL_ADDR, OTP_CTRL_VRR_EN, OTP_FINISH_OK,
        OTP_KEY_ADDR, OTP_KEY_VALUE, OTP_PACKET_HEADER_LEN, OTP_READ_ADDR, OTP_SRAM_ADDR,
        OTP_START_WRITE, OTP_VRR_3V, OTP_VRR_ADDR, PAGE_SIZE, PWM_CTRL_ADDR, PWM_DISABLE,
    },
    Error,
};

/// OTP bytes inspected to decide whether the part was programmed.
pub const OTP_CHECK_LEN: usize = 32;
/// Time the bootloader gets to start after the core reset.
pub const BOOTLOADER_STARTUP_MS: u32 = 10;
/// Interval between two packet status polls.
pub const OTP_STATUS_POLL_MS: u32 = 10;
/// Packet status polls before giving up on a page.
pub const OTP_STATUS_POLLS: usize = 100;

/// One page staged for the bootloader
///
/// ```text
///  0      status
///  1      reserved
///  2..4   start address, LE
///  4..6   code length, LE
///  6..8   checksum, LE
///  8..    code
/// ```
///
/// Trailing zero bytes of the page are not sent; OTP reads as zero where
/// nothing was burnt. The checksum is the wrapping sum of the start
/// address, every code byte and the code length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpPacket {
    bytes: [u8; OTP_PACKET_HEADER_LEN + PAGE_SIZE],
    len: usize,
}

impl OtpPacket {
    /// Stages `page`, to be burnt at OTP address `start`.
    ///
    /// Returns `None` if the page holds no data. Bytes beyond
    /// [`PAGE_SIZE`] are ignored.
    pub fn new(start: u16, page: &[u8]) -> Option<Self> {
        let page = &page[..page.len().min(PAGE_SIZE)];
        let code_len = page.iter().rposition(|&byte| byte != 0)? + 1;
        let code = &page[..code_len];

        let checksum = code
            .iter()
            .fold(start.wrapping_add(code_len as u16), |sum, &byte| {
                sum.wrapping_add(u16::from(byte))
            });

        let mut bytes = [0u8; OTP_PACKET_HEADER_LEN + PAGE_SIZE];
        bytes[2..4].copy_from_slice(&start.to_le_bytes());
        bytes[4..6].copy_from_slice(&(code_len as u16).to_le_bytes());
        bytes[6..8].copy_from_slice(&checksum.to_le_bytes());
        bytes[OTP_PACKET_HEADER_LEN..OTP_PACKET_HEADER_LEN + code_len].copy_from_slice(code);

        Some(Self {
            bytes,
            len: OTP_PACKET_HEADER_LEN + code_len,
        })
    }

    pub fn start(&self) -> u16 {
        u16::from_le_bytes([self.bytes[2], self.bytes[3]])
    }

    pub fn code_len(&self) -> usize {
        self.len - OTP_PACKET_HEADER_LEN
    }

    pub fn checksum(&self) -> u16 {
        u16::from_le_bytes([self.bytes[6], self.bytes[7]])
    }

    /// Header and code as written to [`OTP_SRAM_ADDR`].
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// Programs the configured OTP image unless the part already carries
    /// firmware.
    ///
    /// # Errors
    /// * `Error::Verify` - The bootloader did not read back as written
    /// * `Error::OtpWrite` - The bootloader rejected a page, later pages were not sent
    /// * `Error::Timeout` - The bootloader kept a page busy
    /// * `Error::Bus` - A register access failed
    pub fn program_otp(&self) -> Result<(), Error> {
        if self.check_otp_programmed()? {
            info!("otp already programmed");
            return Ok(());
        }

        self.load_bootloader().inspect_err(|_| {
            error!("otp phase 1 failed");
        })?;
        self.device.sleep_ms(BOOTLOADER_STARTUP_MS);

        self.burn_image(self.config.firmware.otp, 0)
            .inspect_err(|_| {
                error!("otp phase 2 failed");
            })?;

        self.device.write_byte(OTP_KEY_ADDR, OTP_KEY_VALUE)?;
        self.device.write_byte(MAP_ADDR, MAP_NONE)?;

        info!("otp programmed");
        Ok(())
    }

    /// Whether the start of OTP holds any nonzero byte.
    ///
    /// Enables the chip first. Reading OTP halts the firmware, so this is
    /// only meant for bring-up.
    pub fn check_otp_programmed(&self) -> Result<bool, Error> {
        self.chip_enable(true);

        let mut head = [0u8; OTP_CHECK_LEN];
        self.read_otp(0, &mut head)?;
        Ok(head.iter().any(|&byte| byte != 0))
    }

    /// Reads OTP content starting at OTP address `addr`.
    ///
    /// Holds the core and powers the OTP read path, then reads through the
    /// OTP window in pages.
    pub fn read_otp(&self, addr: u16, buf: &mut [u8]) -> Result<(), Error> {
        self.device.write_byte(PWM_CTRL_ADDR, PWM_DISABLE)?;
        self.device.write_byte(OTP_KEY_ADDR, OTP_KEY_VALUE)?;
        self.device.write_byte(M0_CTRL_ADDR, M0_HOLD)?;
        self.device.write_byte(OTP_VRR_ADDR, OTP_VRR_3V)?;
        self.device.write_byte(OTP_CTRL_ADDR, OTP_CTRL_VRR_EN)?;

        let base = OTP_READ_ADDR.checked_add(addr).ok_or(Error::OutOfRange)?;
        for (i, chunk) in buf.chunks_mut(PAGE_SIZE).enumerate() {
            self.device.read_block(page_addr(base, i)?, chunk)?;
        }
        Ok(())
    }

    fn load_bootloader(&self) -> Result<(), Error> {
        self.device.write_byte(OTP_KEY_ADDR, OTP_KEY_VALUE)?;
        self.device.write_byte(M0_CTRL_ADDR, M0_HALT)?;

        let bootloader = self.config.firmware.bootloader;
        for (i, &byte) in bootloader.iter().enumerate() {
            let addr = BOOTLOADER_ADDR
                .checked_add(u16::try_from(i).map_err(|_| Error::OutOfRange)?)
                .ok_or(Error::OutOfRange)?;

            self.device.write_byte(addr, byte)?;
            let read = self.device.read_byte(addr)?;
            if read != byte {
                error!(
                    "bootloader verify failed at {:#x}: wrote {:#x}, read {:#x}",
                    addr, byte, read
                );
                return Err(Error::Verify);
            }
        }
        debug!("bootloader loaded, {} bytes", bootloader.len());

        self.device.write_byte(MAP_ADDR, MAP_RAM_TO_OTP)?;
        // The core is gone once reset, the write is never acknowledged
        let _ = self.device.write_byte(M0_CTRL_ADDR, M0_RESET);
        Ok(())
    }

    fn burn_image(&self, image: &[u8], start: u16) -> Result<(), Error> {
        for (i, page) in image.chunks(PAGE_SIZE).enumerate() {
            let addr = page_addr(start, i)?;
            let Some(packet) = OtpPacket::new(addr, page) else {
                trace!("otp page {:#x} empty", addr);
                continue;
            };

            self.device.write_block(OTP_SRAM_ADDR, packet.as_bytes())?;
            self.device.write_byte(OTP_SRAM_ADDR, OTP_START_WRITE)?;

            let status = self.poll_packet_status()?;
            if status != OTP_FINISH_OK {
                error!("otp page {:#x} failed, status {:#x}", addr, status);
                return Err(Error::OtpWrite(status));
            }
            debug!(
                "otp page {:#x} burnt, {} bytes, checksum {:#x}",
                addr,
                packet.code_len(),
                packet.checksum()
            );
        }
        Ok(())
    }

    fn poll_packet_status(&self) -> Result<u8, Error> {
        for _ in 0..OTP_STATUS_POLLS {
            self.device.sleep_ms(OTP_STATUS_POLL_MS);
            let status = self.device.read_byte(OTP_SRAM_ADDR)?;
            if status != OTP_BUFFER_VALID {
                return Ok(status);
            }
        }
        error!("otp packet still busy");
        Err(Error::Timeout)
    }
}
