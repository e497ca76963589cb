//! Driver context
//!
//! [`Idtp9221`] owns everything the driver needs: the register interface, the
//! platform hooks, the configuration and the small amount of state shared
//! between the interrupt path and the command path.
//!
//! # Important Notes
//! - Every method takes `&self`. Place the context in a `static` (or leak it)
//!   and hand references to the interrupt trigger, the worker and the
//!   charging orchestration.
//! - Acknowledge and data-received notifications are single-valued. Only one
//!   message exchange with the transmitter may be in flight at a time.

use core::{
    cell::Cell,
    sync::atomic::{AtomicBool, AtomicU16, Ordering},
};

use critical_section::Mutex;
use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::{
    config::Config,
    device::Device,
    irq::{AbnormalIrqDetector, Event},
    registers::{IntFlags, InterruptClear},
};

/// Settle time after switching the wired charging channel.
pub const CHANNEL_SWITCH_MS: u32 = 50;

/// Wait after dropping the outputs on shutdown.
pub const SHUTDOWN_SLEEP_MS: u32 = 50;

/// Output voltage both sides are dropped to on shutdown.
pub const SHUTDOWN_VOUT_MV: u32 = 5000;

/// State of the wired charging channel switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WiredChannel {
    /// Wired input disconnected from the charger
    CutOff,
    /// Wired input connected to the charger
    On,
}

/// Board services used by the driver
///
/// All methods may be called from the interrupt worker and from command
/// callers, and must therefore be callable through a shared reference.
/// `enable_irq` and `disable_irq` nest: a source disabled twice must be
/// enabled twice.
pub trait Platform {
    /// Drives the active-low chip enable line.
    fn set_enable_line(&self, high: bool);
    /// Drives the sleep enable line.
    fn set_sleep_enable_line(&self, high: bool);
    /// Whether the active-low interrupt line is currently low.
    fn interrupt_line_asserted(&self) -> bool;
    /// Re-enables delivery of the receiver interrupt.
    fn enable_irq(&self);
    /// Stops delivery of the receiver interrupt.
    fn disable_irq(&self);
    /// Whether wired charging currently powers the charger.
    fn wired_channel_on(&self) -> bool;
    /// Switches the wired charging channel.
    fn set_wired_channel(&self, state: WiredChannel);
    /// Whether wireless charging currently powers the charger.
    fn wireless_channel_on(&self) -> bool;
    /// Broadcasts a receiver event to the power management layer.
    fn notify(&self, event: Event);
    /// Monotonic milliseconds.
    fn now_ms(&self) -> u64;
}

impl<T: Platform + ?Sized> Platform for &T {
    fn set_enable_line(&self, high: bool) {
        (**self).set_enable_line(high)
    }
    fn set_sleep_enable_line(&self, high: bool) {
        (**self).set_sleep_enable_line(high)
    }
    fn interrupt_line_asserted(&self) -> bool {
        (**self).interrupt_line_asserted()
    }
    fn enable_irq(&self) {
        (**self).enable_irq()
    }
    fn disable_irq(&self) {
        (**self).disable_irq()
    }
    fn wired_channel_on(&self) -> bool {
        (**self).wired_channel_on()
    }
    fn set_wired_channel(&self, state: WiredChannel) {
        (**self).set_wired_channel(state)
    }
    fn wireless_channel_on(&self) -> bool {
        (**self).wireless_channel_on()
    }
    fn notify(&self, event: Event) {
        (**self).notify(event)
    }
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// P9221 driver context
pub struct Idtp9221<I2C, D, P> {
    pub(crate) device: Device<I2C, D>,
    pub(crate) platform: P,
    pub(crate) config: Config,
    /// Set while no service episode is scheduled or running
    pub(crate) irq_active: AtomicBool,
    pub(crate) stop_charging: AtomicBool,
    pub(crate) irq_abnormal: AtomicBool,
    pub(crate) last_status: AtomicU16,
    /// Ack and data-received bits posted by the interrupt path
    pub(crate) pending: AtomicU16,
    pub(crate) detector: Mutex<Cell<AbnormalIrqDetector>>,
}

impl<I2C, D, P> Idtp9221<I2C, D, P> {
    /// Creates the driver context. No hardware is touched until
    /// [`start`](Self::start).
    pub fn new(i2c: I2C, delay: D, platform: P, config: Config) -> Self {
        Self::with_device(Device::new(i2c, delay), platform, config)
    }

    /// Creates the driver context around an existing register interface.
    pub fn with_device(device: Device<I2C, D>, platform: P, config: Config) -> Self {
        Self {
            device,
            platform,
            config,
            irq_active: AtomicBool::new(true),
            stop_charging: AtomicBool::new(false),
            irq_abnormal: AtomicBool::new(false),
            last_status: AtomicU16::new(0),
            pending: AtomicU16::new(0),
            detector: Mutex::new(Cell::new(AbnormalIrqDetector::new())),
        }
    }

    /// Returns the register interface.
    pub fn device(&self) -> &Device<I2C, D> {
        &self.device
    }

    /// Returns the platform hooks.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the abnormal interrupt detector latched and the interrupt
    /// source is parked.
    pub fn irq_abnormal(&self) -> bool {
        self.irq_abnormal.load(Ordering::Acquire)
    }

    /// Whether a caller asked to stop charging since the last ready event.
    pub fn charging_stopped(&self) -> bool {
        self.stop_charging.load(Ordering::Acquire)
    }

    /// Status bits observed by the most recent service episode.
    pub fn last_interrupt_status(&self) -> IntFlags {
        IntFlags::from_bits_retain(self.last_status.load(Ordering::Acquire))
    }

    pub(crate) fn post_pending(&self, flags: IntFlags) {
        let bits = (flags & (IntFlags::TX_ACK | IntFlags::TX_DATA_RECEIVED)).bits();
        if bits != 0 {
            self.pending.fetch_or(bits, Ordering::AcqRel);
        }
    }

    pub(crate) fn drop_pending(&self, flags: IntFlags) {
        self.pending.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Clears `flags` from the pending set, returning whether any was set.
    pub(crate) fn take_pending(&self, flags: IntFlags) -> bool {
        self.pending.fetch_and(!flags.bits(), Ordering::AcqRel) & flags.bits() != 0
    }

    pub(crate) fn reset_detector(&self) {
        critical_section::with(|cs| self.detector.borrow(cs).set(AbnormalIrqDetector::new()));
    }
}

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// Brings the receiver into its idle state.
    ///
    /// Enables the chip. If a transmitter is already present the pending
    /// interrupts are dropped and the ready sequence runs right away, since
    /// its interrupt fired before the driver was listening. Otherwise the
    /// chip is allowed to sleep until a transmitter shows up.
    pub fn start(&self) {
        self.chip_enable(true);
        self.platform.set_sleep_enable_line(false);

        if self.check_tx_exist() {
            info!("transmitter present at start");
            if self.clear_interrupts(InterruptClear::ALL.flags).is_err() {
                warn!("clearing interrupts at start failed");
            }
            self.handle_ready();
        } else {
            self.platform.set_sleep_enable_line(true);
        }
    }

    /// Requests 5 V on both sides before the system powers off.
    pub fn shutdown(&self) {
        if !self.platform.wireless_channel_on() {
            return;
        }

        if self.set_tx_vout(SHUTDOWN_VOUT_MV).is_err() {
            warn!("shutdown: tx vout not reached");
        }
        if self.set_rx_vout(SHUTDOWN_VOUT_MV).is_err() {
            warn!("shutdown: setting rx vout failed");
        }
        self.device.sleep_ms(SHUTDOWN_SLEEP_MS);
    }

    /// Aborts pending message exchanges and voltage ramps.
    ///
    /// If the abnormal interrupt detector parked the interrupt source while
    /// wired charging took over, the source is re-armed.
    pub fn stop_charging(&self) {
        if self.irq_abnormal() && self.platform.wired_channel_on() {
            self.reset_detector();
            self.irq_abnormal.store(false, Ordering::Release);
            self.platform.enable_irq();
            info!("wired channel on, interrupt re-armed");
        }
        self.stop_charging.store(true, Ordering::Release);
    }
}
