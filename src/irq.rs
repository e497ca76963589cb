//! Interrupt handling
//!
//! Interrupt servicing is split in two halves:
//! - [`Idtp9221::on_interrupt`] runs in the interrupt context. It parks the
//!   interrupt source and reports whether the second half must run.
//! - [`Idtp9221::service_interrupt`] runs in a context that may sleep, see
//!   [`crate::worker`]. It reads and clears the status register, dispatches
//!   every latched event and re-arms the source.
//!
//! Only one service episode exists at a time: the source stays disabled from
//! the first half until the end of the second.
//!
//! # Abnormal interrupt detection
//! A receiver sitting on a bad coil keeps powering on and off. Power-on
//! interrupts (and unreadable status registers) are counted by
//! [`AbnormalIrqDetector`]. Once [`AbnormalIrqDetector::THRESHOLD`] of them
//! arrive within [`AbnormalIrqDetector::WINDOW_MS`], the source is parked,
//! the wired charging channel is cut off and the chip is kept out of sleep.
//! Parking means the episode ends without re-enabling the source, so it
//! stays disabled exactly once. The source is re-armed by
//! [`Idtp9221::stop_charging`] once wired charging runs, or by
//! [`Idtp9221::on_vbus_change`] once a transmitter is back.

use core::sync::atomic::Ordering;

use embedded_hal::{delay::DelayNs, i2c::I2c};

use crate::{
    protocol::{Frame, MessageCommand},
    receiver::{Idtp9221, Platform, WiredChannel, CHANNEL_SWITCH_MS},
    registers::{IntFlags, InterruptClear, InterruptStatus, TX_TO_RX_DATA_ADDR, TX_TO_RX_DATA_LEN},
    Error,
};

/// Time the charger gets to apply a new input current limit before the
/// transmitter is told.
pub const CURRENT_LIMIT_SETTLE_MS: u32 = 300;

/// Receiver events broadcast to the power management layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Output is up and the wired channel was cut over
    RxReady,
    /// A transmitter field powered the receiver
    RxPowerOn {
        /// Signal strength is above the configured threshold
        good_signal: bool,
    },
    /// Output over current
    RxOverCurrent,
    /// Rectifier over voltage
    RxOverVoltage,
    /// Die over temperature
    RxOverTemperature,
    /// The transmitter asks for the serial number
    SerialNumberRequested,
    /// The transmitter asks for the battery temperature
    BatteryTemperatureRequested,
    /// The transmitter asks for the battery capacity
    BatteryCapacityRequested,
    /// The transmitter sets the input current limit, raw value
    CurrentLimitSet(u8),
    /// The transmitter starts a sample window
    StartSample,
    /// The transmitter ends a sample window
    StopSample,
}

/// Outcome of recording an interrupt with [`AbnormalIrqDetector`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// The window is still open
    Counting,
    /// The window closed below the threshold, counting starts over
    Reset,
    /// The window closed at or above the threshold
    Abnormal,
}

/// Interrupt storm detector
///
/// The first recorded interrupt opens a window of [`Self::WINDOW_MS`]. The
/// first interrupt recorded at or after the end of the window closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AbnormalIrqDetector {
    count: u32,
    deadline_ms: u64,
}

impl AbnormalIrqDetector {
    /// Interrupts per window that mark the source as abnormal.
    pub const THRESHOLD: u32 = 10;
    /// Observation window.
    pub const WINDOW_MS: u64 = 15_000;

    /// Creates an idle detector.
    pub const fn new() -> Self {
        Self {
            count: 0,
            deadline_ms: 0,
        }
    }

    /// Interrupts recorded in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Records an interrupt at `now_ms`.
    pub fn record(&mut self, now_ms: u64) -> Verdict {
        self.count = self.count.saturating_add(1);

        if self.count == 1 {
            match now_ms.checked_add(Self::WINDOW_MS) {
                Some(deadline) => self.deadline_ms = deadline,
                None => {
                    self.count = 0;
                    return Verdict::Reset;
                }
            }
        }

        if now_ms < self.deadline_ms {
            return Verdict::Counting;
        }

        if self.count >= Self::THRESHOLD {
            Verdict::Abnormal
        } else {
            self.count = 0;
            Verdict::Reset
        }
    }

    /// Starts counting over.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}

impl<I2C, D, P> Idtp9221<I2C, D, P>
where
    I2C: I2c,
    D: DelayNs + Clone,
    P: Platform,
{
    /// First half of interrupt handling, safe to call from interrupt
    /// context.
    ///
    /// Returns `true` if the source was parked and
    /// [`service_interrupt`](Self::service_interrupt) must run.
    pub fn on_interrupt(&self) -> bool {
        if !self.platform.interrupt_line_asserted() || self.irq_abnormal() {
            return false;
        }

        if self.irq_active.swap(false, Ordering::AcqRel) {
            self.platform.disable_irq();
            true
        } else {
            false
        }
    }

    /// Second half of interrupt handling.
    pub fn service_interrupt(&self) {
        match self.device.read_register::<InterruptStatus>() {
            Ok(status) => self.dispatch(status.flags),
            Err(_) => {
                error!("reading interrupt status failed, clearing all");
                let _ = self.clear_interrupts(InterruptClear::ALL.flags);
                self.run_abnormal_detector();
            }
        }

        if self.platform.interrupt_line_asserted() {
            if let Ok(late) = self.device.read_register::<InterruptStatus>() {
                debug!("line still asserted, status {:#x}", late.flags.bits());
            }
            if self.clear_interrupts(InterruptClear::ALL.flags).is_err() {
                error!("catch-up clear failed");
            }
        }

        if !self.irq_active.swap(true, Ordering::AcqRel) && !self.irq_abnormal() {
            self.platform.enable_irq();
        }
    }

    fn dispatch(&self, status: IntFlags) {
        debug!("interrupt status {:#x}", status.bits());
        self.last_status.store(status.bits(), Ordering::Release);
        self.post_pending(status);

        if self.clear_interrupts(status).is_err() {
            error!("clearing interrupt status failed");
        }

        if status.contains(IntFlags::READY) {
            self.handle_ready();
        }
        if status.contains(IntFlags::POWER_ON) {
            self.handle_power_on();
        }
        if status.contains(IntFlags::OVER_CURRENT) {
            self.platform.notify(Event::RxOverCurrent);
        }
        if status.contains(IntFlags::OVER_VOLTAGE) {
            self.platform.notify(Event::RxOverVoltage);
        }
        if status.contains(IntFlags::OVER_TEMPERATURE) {
            self.platform.notify(Event::RxOverTemperature);
        }
        if status.contains(IntFlags::TX_DATA_RECEIVED) {
            if self.handle_data_received().is_err() {
                error!("handling transmitter message failed");
            }
        }
    }

    /// Switches charging over to the wireless path once the output is up.
    pub(crate) fn handle_ready(&self) {
        if self.platform.wired_channel_on() {
            return;
        }

        info!("rx ready, switching to wireless charging");
        self.stop_charging.store(false, Ordering::Release);
        self.reset_detector();
        self.platform.set_wired_channel(WiredChannel::CutOff);
        self.device.sleep_ms(CHANNEL_SWITCH_MS);
        self.platform.set_sleep_enable_line(false);
        self.platform.notify(Event::RxReady);
    }

    fn handle_power_on(&self) {
        self.run_abnormal_detector();

        let strength = self.get_signal_strength().unwrap_or(0);
        info!("power on, signal strength {}", strength);
        self.platform.notify(Event::RxPowerOn {
            good_signal: strength > self.config.signal_strength_good,
        });
    }

    fn handle_data_received(&self) -> Result<(), Error> {
        let mut window = [0u8; TX_TO_RX_DATA_LEN];
        self.device.read_block(TX_TO_RX_DATA_ADDR, &mut window)?;
        let frame = Frame::decode(&window)?;

        let event = match MessageCommand::try_from(frame.command()) {
            Ok(MessageCommand::SendSerialNumber) => Event::SerialNumberRequested,
            Ok(MessageCommand::SendBatteryTemperature) => Event::BatteryTemperatureRequested,
            Ok(MessageCommand::SendBatteryCapacity) => Event::BatteryCapacityRequested,
            Ok(MessageCommand::SetCurrentLimit) => Event::CurrentLimitSet(frame.payload()[0]),
            Ok(MessageCommand::StartSample) => Event::StartSample,
            Ok(MessageCommand::StopSample) => Event::StopSample,
            _ => {
                // Answer to a query, left for the waiting caller
                debug!("message {:#x} left pending", frame.command());
                return Ok(());
            }
        };

        self.drop_pending(IntFlags::TX_DATA_RECEIVED);
        info!("transmitter request {:#x}", frame.command());
        self.platform.notify(event);

        if let Event::CurrentLimitSet(limit) = event {
            self.device.sleep_ms(CURRENT_LIMIT_SETTLE_MS);
            self.send(MessageCommand::SetCurrentLimit.code(), &[limit])?;
        }

        Ok(())
    }

    fn run_abnormal_detector(&self) {
        let now = self.platform.now_ms();
        let verdict = critical_section::with(|cs| {
            let cell = self.detector.borrow(cs);
            let mut detector = cell.get();
            let verdict = detector.record(now);
            cell.set(detector);
            verdict
        });

        if verdict != Verdict::Abnormal {
            return;
        }

        error!(
            "{} interrupts within {} ms, parking interrupt",
            AbnormalIrqDetector::THRESHOLD,
            AbnormalIrqDetector::WINDOW_MS
        );
        // The source stays disabled from on_interrupt
        self.irq_abnormal.store(true, Ordering::Release);
        self.platform.set_wired_channel(WiredChannel::CutOff);
        self.device.sleep_ms(CHANNEL_SWITCH_MS);
        self.platform.set_sleep_enable_line(false);
    }

    /// VBUS state change from the power management layer.
    ///
    /// Recovers a parked interrupt source when a transmitter brought the
    /// output back while wired charging is off: if the chip reports ready,
    /// the ready sequence runs and the source is re-armed.
    pub fn on_vbus_change(&self, present: bool) {
        if !present
            || !self.irq_abnormal()
            || self.platform.wired_channel_on()
            || !self.check_tx_exist()
        {
            return;
        }

        let status = match self.device.read_register::<InterruptStatus>() {
            Ok(status) => status.flags,
            Err(_) => {
                error!("vbus recovery: reading interrupt status failed");
                return;
            }
        };
        debug!("vbus recovery, status {:#x}", status.bits());

        if status.contains(IntFlags::READY) {
            let _ = self.clear_interrupts(InterruptClear::ALL.flags);
            self.handle_ready();
            self.reset_detector();
            self.irq_abnormal.store(false, Ordering::Release);
            self.platform.enable_irq();
            info!("vbus recovery, interrupt re-armed");
        }
    }
}
