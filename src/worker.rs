//! Interrupt worker
//!
//! Drives both halves of interrupt handling from an async task waiting on
//! the INT pin. Boards that dispatch the pin interrupt themselves call
//! [`Idtp9221::on_interrupt`] from the handler and
//! [`Idtp9221::service_interrupt`] from their own task instead.
//!
//! # Deployment
//! The command methods wait for acknowledgements and received data with
//! blocking sleeps, and servicing an interrupt blocks too. The worker must
//! therefore be able to run while a command method is blocked: spawn it on
//! a higher priority (interrupt) executor or on its own thread. Sharing one
//! cooperative executor with the caller starves the worker, and every
//! exchange then fails with [`Error::NoAck`](crate::Error::NoAck).
//!
//! # Example
//! ```no_run
//! use core::convert::Infallible;
//!
//! use embedded_hal::{delay::DelayNs, i2c::I2c};
//! use embedded_hal_async::digital::Wait;
//! use idtp9221::{worker::run_irq_worker, Idtp9221, Platform};
//!
//! async fn irq_task<I2C, D, P, W>(rx: &Idtp9221<I2C, D, P>, mut int_pin: W) -> W::Error
//! where
//!     I2C: I2c,
//!     D: DelayNs + Clone,
//!     P: Platform,
//!     W: Wait,
//! {
//!     match run_irq_worker(rx, &mut int_pin).await {
//!         Ok(never) => match never {},
//!         Err(err) => err,
//!     }
//! }
//! ```

use core::convert::Infallible;

use embedded_hal::{delay::DelayNs, i2c::I2c};
use embedded_hal_async::digital::Wait;

use crate::receiver::{Idtp9221, Platform};

/// Services the receiver interrupt on every falling edge of `int_pin`.
///
/// Only returns if waiting on the pin fails. Must not share a cooperative
/// executor with the context calling the command methods, see the
/// [module docs](self).
pub async fn run_irq_worker<I2C, D, P, W>(
    rx: &Idtp9221<I2C, D, P>,
    int_pin: &mut W,
) -> Result<Infallible, W::Error>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
    W: Wait,
{
    loop {
        int_pin.wait_for_falling_edge().await?;
        if rx.on_interrupt() {
            rx.service_interrupt();
        }
    }
}
