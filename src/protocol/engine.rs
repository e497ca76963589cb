//! Message exchange with the transmitter
//!
//! The chip reports acknowledges and received packets only through its
//! interrupt, so the exchange methods never poll the status register
//! themselves. They sleep in fixed steps and look at the flags the
//! interrupt path posted in between.
//!
//! # Important Notes
//! - Only one exchange may be in flight at a time
//! - Every wait checks the stop-charging flag and bails out with
//!   `Error::Stopped` at the next step
//! - [`Idtp9221::send`] drops a stale acknowledge before sending

use core::sync::atomic::Ordering;

use embedded_hal::{delay::DelayNs, i2c::I2c};

use super::Frame;
use crate::{
    receiver::{Idtp9221, Platform},
    registers::{
        Command, CommandFlags, IntFlags, RxToTxCommand, RxToTxHeader, RX_TO_TX_DATA_ADDR,
        TX_TO_RX_DATA_ADDR, TX_TO_RX_DATA_LEN,
    },
    Error,
};

/// Sends of a packet before [`Idtp9221::send_with_ack`] gives up.
pub const SEND_RETRY_COUNT: usize = 2;
/// Acknowledge polls after each send.
pub const ACK_POLL_COUNT: usize = 5;
/// Interval between two acknowledge polls.
pub const ACK_POLL_MS: u32 = 100;
/// Polls for a packet from the transmitter.
pub const RECEIVE_POLL_COUNT: usize = 10;
/// Interval between two receive polls.
pub const RECEIVE_POLL_MS: u32 = 100;
/// Round trips of a transmitter query before giving up.
pub const QUERY_RETRY_COUNT: usize = 2;

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    fn is_stopped(&self) -> bool {
        self.stop_charging.load(Ordering::Acquire)
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), Error> {
        self.drop_pending(IntFlags::TX_ACK);

        self.device.write_register(RxToTxHeader {
            value: frame.header(),
        })?;
        self.device.write_register(RxToTxCommand {
            value: frame.command(),
        })?;
        if !frame.payload().is_empty() {
            self.device.write_block(RX_TO_TX_DATA_ADDR, frame.payload())?;
        }
        self.device
            .write_register(Command::new(CommandFlags::SEND_RX_DATA))
    }

    /// Sends a packet without waiting for the acknowledge.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `payload` is longer than four bytes, nothing was written
    /// * `Error::Bus` - A register write failed
    pub fn send(&self, command: u8, payload: &[u8]) -> Result<(), Error> {
        let frame = Frame::new(command, payload)?;
        self.write_frame(&frame).inspect_err(|_| {
            error!("send {:#x} failed", command);
        })
    }

    /// Sends a packet and waits for the transmitter to acknowledge it.
    ///
    /// The packet is sent up to [`SEND_RETRY_COUNT`] times. After each send
    /// the acknowledge is polled [`ACK_POLL_COUNT`] times, [`ACK_POLL_MS`]
    /// apart. A send that fails on the bus counts as an unacknowledged
    /// attempt.
    ///
    /// # Errors
    /// * `Error::OutOfRange` - `payload` is longer than four bytes, nothing was written
    /// * `Error::Stopped` - Charging was stopped while waiting
    /// * `Error::NoAck` - No attempt was acknowledged
    pub fn send_with_ack(&self, command: u8, payload: &[u8]) -> Result<(), Error> {
        let frame = Frame::new(command, payload)?;

        for attempt in 0..SEND_RETRY_COUNT {
            if self.write_frame(&frame).is_err() {
                warn!("send {:#x} failed, attempt {}", command, attempt);
                continue;
            }

            for _ in 0..ACK_POLL_COUNT {
                self.device.sleep_ms(ACK_POLL_MS);
                if self.take_pending(IntFlags::TX_ACK) {
                    debug!("{:#x} acknowledged, attempt {}", command, attempt);
                    return Ok(());
                }
                if self.is_stopped() {
                    warn!("waiting for ack aborted, charging stopped");
                    return Err(Error::Stopped);
                }
            }
            debug!("no ack for {:#x}, attempt {}", command, attempt);
        }

        error!("{:#x} not acknowledged", command);
        Err(Error::NoAck)
    }

    /// Waits for a packet from the transmitter.
    ///
    /// The receive window is zeroed first so that a stale packet is not
    /// mistaken for the answer.
    ///
    /// # Errors
    /// * `Error::Stopped` - Charging was stopped while waiting
    /// * `Error::NoData` - The window was still empty after the last poll
    /// * `Error::Bus` - Accessing the window failed
    pub fn receive(&self) -> Result<Frame, Error> {
        self.device
            .write_block(TX_TO_RX_DATA_ADDR, &[0; TX_TO_RX_DATA_LEN])?;

        for _ in 0..RECEIVE_POLL_COUNT {
            if self.take_pending(IntFlags::TX_DATA_RECEIVED) {
                break;
            }
            if self.is_stopped() {
                warn!("receive aborted, charging stopped");
                return Err(Error::Stopped);
            }
            self.device.sleep_ms(RECEIVE_POLL_MS);
        }

        let mut window = [0u8; TX_TO_RX_DATA_LEN];
        self.device.read_block(TX_TO_RX_DATA_ADDR, &mut window)?;

        Frame::decode(&window).inspect_err(|_| {
            error!("no message from transmitter");
        })
    }

    /// Sends `command` with `params` and waits for the answer, retrying the
    /// whole round trip up to [`QUERY_RETRY_COUNT`] times.
    ///
    /// The answer is returned as received; callers check the echoed command.
    pub fn query(&self, command: u8, params: &[u8]) -> Result<Frame, Error> {
        let mut last_error = Error::NoData;

        for attempt in 0..QUERY_RETRY_COUNT {
            match self.send(command, params).and_then(|_| self.receive()) {
                Ok(frame) => return Ok(frame),
                Err(Error::Stopped) => return Err(Error::Stopped),
                Err(err @ Error::OutOfRange) => return Err(err),
                Err(err) => {
                    warn!("query {:#x} failed, attempt {}", command, attempt);
                    last_error = err;
                }
            }
        }

        Err(last_error)
    }

    /// Queries a transmitter parameter that takes no arguments.
    pub fn get_tx_parameter(&self, command: u8) -> Result<Frame, Error> {
        self.query(command, &[])
    }
}
