//! Test doubles shared by the unit tests
//!
//! [`ChipModel`] is a register-level model of the P9221 that reacts to the
//! command register the way the chip does. [`FakeBus`] puts it behind the
//! embedded-hal I2C trait, [`FakePlatform`] records what the driver does to
//! the board and [`TestDelay`] records sleeps and can run a hook on each of
//! them, which is how the tests emulate the interrupt worker.

extern crate std;

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::{
    boxed::Box,
    collections::VecDeque,
    sync::{Arc, Mutex},
    vec,
    vec::Vec,
};

use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation},
};

use crate::{
    irq::Event,
    receiver::{Idtp9221, Platform, WiredChannel},
    registers::{
        CommandFlags, IntFlags, ModeFlags, COMMAND1_UNLOCK_SWITCH, M0_CTRL_ADDR, M0_RESET,
        OTP_FINISH_OK, OTP_SRAM_ADDR, OTP_START_WRITE, RX_TO_TX_DATA_ADDR, RX_TO_TX_DATA_LEN,
        TX_TO_RX_DATA_ADDR,
    },
    Config,
};

const STATUS: u16 = 0x0036;
const CLEAR: u16 = 0x0056;
const MODE: u16 = 0x004C;
const COMMAND: u16 = 0x004E;
const COMMAND1: u16 = 0x004F;
const RX_HEADER: u16 = 0x0050;
const RX_COMMAND: u16 = 0x0051;
const VOUT: u16 = 0x003C;
const TX_VOUT_SET: u16 = 0x0078;

/// A bus access seen by the model
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Read(u16, usize),
    Write(u16, Vec<u8>),
}

/// Register-level model of the chip
pub struct ChipModel {
    regs: Vec<u8>,
    ops: Vec<Op>,
    raw_writes: Vec<Vec<u8>>,
    failures: usize,
    commands: Vec<u8>,
    clear_commands: usize,
    raise_after_clear: Option<IntFlags>,
    auto_ack: bool,
    ack_after: Option<usize>,
    sends: usize,
    sent_frames: Vec<Vec<u8>>,
    responses: Vec<(u8, [u8; 5])>,
    pending_ack: bool,
    pending_response: Option<[u8; 5]>,
    track_fast_charge: bool,
    accept_sram_switch: bool,
    nak_m0_reset: bool,
    corrupt: Option<(u16, u8)>,
    otp_results: VecDeque<u8>,
    otp_busy_reads: usize,
    otp_write: Option<(usize, u8)>,
}

impl Default for ChipModel {
    fn default() -> Self {
        Self {
            regs: vec![0; 0x1_0000],
            ops: Vec::new(),
            raw_writes: Vec::new(),
            failures: 0,
            commands: Vec::new(),
            clear_commands: 0,
            raise_after_clear: None,
            auto_ack: false,
            ack_after: None,
            sends: 0,
            sent_frames: Vec::new(),
            responses: Vec::new(),
            pending_ack: false,
            pending_response: None,
            track_fast_charge: false,
            accept_sram_switch: true,
            nak_m0_reset: false,
            corrupt: None,
            otp_results: VecDeque::new(),
            otp_busy_reads: 0,
            otp_write: None,
        }
    }
}

impl ChipModel {
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn write_u8(&mut self, addr: u16, value: u8) {
        self.write_block(addr, &[value]);
    }

    pub fn write_u16(&mut self, addr: u16, value: u16) {
        self.write_block(addr, &value.to_le_bytes());
    }

    pub fn write_block(&mut self, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.regs[usize::from(addr.wrapping_add(i as u16))] = *byte;
        }
    }

    pub fn read_u8(&self, addr: u16) -> u8 {
        self.regs[usize::from(addr)]
    }

    pub fn read_u16(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read_u8(addr), self.read_u8(addr.wrapping_add(1))])
    }

    pub fn read_block(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read_u8(addr.wrapping_add(i as u16)))
            .collect()
    }

    pub fn set_status(&mut self, flags: IntFlags) {
        self.write_u16(STATUS, flags.bits());
    }

    pub fn status(&self) -> IntFlags {
        IntFlags::from_bits_retain(self.read_u16(STATUS))
    }

    /// Bus accesses so far, direct accessors excluded.
    pub fn ops(&self) -> Vec<Op> {
        self.ops.clone()
    }

    /// Write transfers as seen on the wire: address bytes then payload.
    pub fn raw_writes(&self) -> Vec<Vec<u8>> {
        self.raw_writes.clone()
    }

    /// Fails the next `n` bus transactions.
    pub fn fail_next(&mut self, n: usize) {
        self.failures = n;
    }

    pub fn clear_commands(&self) -> usize {
        self.clear_commands
    }

    /// Every byte written to the command register.
    pub fn commands(&self) -> Vec<u8> {
        self.commands.clone()
    }

    /// Acknowledges every packet sent to the transmitter.
    pub fn set_auto_ack(&mut self, enabled: bool) {
        self.auto_ack = enabled;
    }

    /// Acknowledges packets from the `n`th send on.
    pub fn ack_after_sends(&mut self, n: usize) {
        self.ack_after = Some(n);
    }

    /// Answers every packet with command `command` with `window`.
    pub fn respond(&mut self, command: u8, window: [u8; 5]) {
        self.responses.push((command, window));
    }

    /// Places a packet in the TX→RX window and raises its interrupt.
    pub fn inject_tx_message(&mut self, window: [u8; 5]) {
        self.write_block(TX_TO_RX_DATA_ADDR, &window);
        let status = self.status() | IntFlags::TX_DATA_RECEIVED;
        self.set_status(status);
    }

    /// Raises `flags` right after the next clear command.
    pub fn raise_after_clear(&mut self, flags: IntFlags) {
        self.raise_after_clear = Some(flags);
    }

    /// Lets the output voltage follow fast charge requests.
    pub fn track_fast_charge(&mut self, enabled: bool) {
        self.track_fast_charge = enabled;
    }

    pub fn accept_sram_switch(&mut self, enabled: bool) {
        self.accept_sram_switch = enabled;
    }

    /// Refuses the M0 reset write like the chip does once the bootloader runs.
    pub fn nak_m0_reset(&mut self, enabled: bool) {
        self.nak_m0_reset = enabled;
    }

    /// Flips bits of `addr` on every read.
    pub fn corrupt_read(&mut self, addr: u16, xor: u8) {
        self.corrupt = Some((addr, xor));
    }

    /// Final status of the next OTP packets, success once exhausted.
    pub fn set_otp_results(&mut self, results: &[u8]) {
        self.otp_results = results.iter().copied().collect();
    }

    /// Status reads that still see the packet busy.
    pub fn otp_busy_reads(&mut self, reads: usize) {
        self.otp_busy_reads = reads;
    }

    /// Packets sent to the transmitter, command byte first.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.sent_frames.clone()
    }

    /// Delivers whatever the transmitter has to say since the last tick.
    pub fn tick(&mut self) {
        if core::mem::take(&mut self.pending_ack) {
            let status = self.status() | IntFlags::TX_ACK;
            self.set_status(status);
        }
        if let Some(window) = self.pending_response.take() {
            self.inject_tx_message(window);
        }
    }

    fn take_failure(&mut self) -> bool {
        if self.failures == 0 {
            return false;
        }
        self.failures -= 1;
        true
    }

    fn bus_read(&mut self, addr: u16, buf: &mut [u8]) {
        self.ops.push(Op::Read(addr, buf.len()));

        if addr == OTP_SRAM_ADDR {
            self.otp_write = match self.otp_write {
                Some((0, result)) => {
                    self.write_u8(OTP_SRAM_ADDR, result);
                    None
                }
                Some((busy, result)) => Some((busy - 1, result)),
                None => None,
            };
        }

        for (i, byte) in buf.iter_mut().enumerate() {
            let at = addr.wrapping_add(i as u16);
            *byte = self.read_u8(at);
            if let Some((corrupt, xor)) = self.corrupt {
                if corrupt == at {
                    *byte ^= xor;
                }
            }
        }
    }

    fn bus_write(&mut self, addr: u16, data: &[u8]) -> Result<(), ErrorKind> {
        if self.nak_m0_reset && addr == M0_CTRL_ADDR && data == [M0_RESET] {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }

        self.ops.push(Op::Write(addr, data.to_vec()));
        let mut raw = addr.to_be_bytes().to_vec();
        raw.extend_from_slice(data);
        self.raw_writes.push(raw);
        self.write_block(addr, data);

        match addr {
            COMMAND => {
                if let Some(&command) = data.first() {
                    self.run_command(CommandFlags::from_bits_retain(command));
                }
            }
            OTP_SRAM_ADDR if data == [OTP_START_WRITE] => {
                let result = self.otp_results.pop_front().unwrap_or(OTP_FINISH_OK);
                self.otp_write = Some((self.otp_busy_reads, result));
            }
            _ => {}
        }
        Ok(())
    }

    fn run_command(&mut self, command: CommandFlags) {
        self.commands.push(command.bits());

        if command.contains(CommandFlags::CLEAR_INTERRUPT) {
            self.clear_commands += 1;
            let mask = IntFlags::from_bits_retain(self.read_u16(CLEAR));
            let mut status = self.status() - mask;
            if let Some(raised) = self.raise_after_clear.take() {
                status |= raised;
            }
            self.set_status(status);
        }

        if command.contains(CommandFlags::SEND_RX_DATA) {
            self.record_frame();
        }

        if command.contains(CommandFlags::SWITCH_TO_SRAM)
            && self.accept_sram_switch
            && self.read_u8(COMMAND1) == COMMAND1_UNLOCK_SWITCH
        {
            let mode = self.read_u8(MODE) | ModeFlags::RAM_PROGRAM.bits();
            self.write_u8(MODE, mode);
        }

        if command.contains(CommandFlags::FAST_CHARGE) && self.track_fast_charge {
            let target = u32::from(self.read_u16(TX_VOUT_SET));
            let raw = (target * 4095).div_ceil(12600);
            self.write_u16(VOUT, raw as u16);
        }

        self.write_u8(COMMAND, 0);
    }

    fn record_frame(&mut self) {
        let header = self.read_u8(RX_HEADER);
        let len = usize::from(header >> 4)
            .saturating_sub(1)
            .min(RX_TO_TX_DATA_LEN);

        let mut frame = vec![self.read_u8(RX_COMMAND)];
        frame.extend(self.read_block(RX_TO_TX_DATA_ADDR, len));

        self.sends += 1;
        if self.auto_ack || self.ack_after.is_some_and(|n| self.sends >= n) {
            self.pending_ack = true;
        }
        if let Some((_, window)) = self.responses.iter().find(|(c, _)| *c == frame[0]) {
            self.pending_response = Some(*window);
        }
        self.sent_frames.push(frame);
    }
}

/// I2C bus backed by a [`ChipModel`]
pub struct FakeBus(Arc<Mutex<ChipModel>>);

impl FakeBus {
    pub fn new(model: Arc<Mutex<ChipModel>>) -> Self {
        Self(model)
    }
}

impl ErrorType for FakeBus {
    type Error = ErrorKind;
}

impl I2c for FakeBus {
    fn transaction(
        &mut self,
        _address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut model = self.0.lock().unwrap();
        if model.take_failure() {
            return Err(ErrorKind::Other);
        }

        let (first, rest) = operations.split_first_mut().ok_or(ErrorKind::Other)?;
        let Operation::Write(header) = first else {
            return Err(ErrorKind::Other);
        };
        if header.len() < 2 {
            return Err(ErrorKind::Other);
        }
        let addr = u16::from_be_bytes([header[0], header[1]]);

        let mut data = header[2..].to_vec();
        for op in rest.iter_mut() {
            match op {
                Operation::Write(bytes) => data.extend_from_slice(bytes),
                Operation::Read(buf) => model.bus_read(addr, buf),
            }
        }

        if !data.is_empty() {
            model.bus_write(addr, &data)?;
        }
        Ok(())
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DelayState {
    calls: usize,
    recorded: Vec<u32>,
    hook: Option<Hook>,
}

/// Delay that returns immediately and records what was asked of it
#[derive(Clone, Default)]
pub struct TestDelay {
    state: Arc<Mutex<DelayState>>,
    in_hook: Arc<AtomicBool>,
}

impl TestDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of delays of any unit.
    pub fn calls(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// Millisecond delays in call order.
    pub fn recorded(&self) -> Vec<u32> {
        self.state.lock().unwrap().recorded.clone()
    }

    pub fn total_ms(&self) -> u32 {
        self.recorded().iter().sum()
    }

    /// Runs `hook` after every millisecond delay. Delays taken by the hook
    /// itself are recorded but do not run it again.
    pub fn set_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.state.lock().unwrap().hook = Some(Arc::new(hook));
    }
}

impl DelayNs for TestDelay {
    fn delay_ns(&mut self, _ns: u32) {
        self.state.lock().unwrap().calls += 1;
    }

    fn delay_us(&mut self, _us: u32) {
        self.state.lock().unwrap().calls += 1;
    }

    fn delay_ms(&mut self, ms: u32) {
        let hook = {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            state.recorded.push(ms);
            state.hook.clone()
        };

        if let Some(hook) = hook {
            if !self.in_hook.swap(true, Ordering::SeqCst) {
                hook();
                self.in_hook.store(false, Ordering::SeqCst);
            }
        }
    }
}

/// Board double recording lines, channels and events
pub struct FakePlatform {
    model: Arc<Mutex<ChipModel>>,
    enable_line: AtomicBool,
    sleep_enable_line: AtomicBool,
    enable_count: AtomicUsize,
    disable_count: AtomicUsize,
    wired_on: AtomicBool,
    wireless_on: AtomicBool,
    wired_channel: Mutex<Option<WiredChannel>>,
    events: Mutex<Vec<Event>>,
    now_ms: AtomicU64,
}

impl FakePlatform {
    pub fn new(model: Arc<Mutex<ChipModel>>) -> Self {
        Self {
            model,
            enable_line: AtomicBool::new(true),
            sleep_enable_line: AtomicBool::new(false),
            enable_count: AtomicUsize::new(0),
            disable_count: AtomicUsize::new(0),
            wired_on: AtomicBool::new(false),
            wireless_on: AtomicBool::new(false),
            wired_channel: Mutex::new(None),
            events: Mutex::new(Vec::new()),
            now_ms: AtomicU64::new(0),
        }
    }

    pub fn enable_line(&self) -> bool {
        self.enable_line.load(Ordering::SeqCst)
    }

    pub fn sleep_enable_line(&self) -> bool {
        self.sleep_enable_line.load(Ordering::SeqCst)
    }

    pub fn enable_count(&self) -> usize {
        self.enable_count.load(Ordering::SeqCst)
    }

    pub fn disable_count(&self) -> usize {
        self.disable_count.load(Ordering::SeqCst)
    }

    pub fn set_wired_on(&self, on: bool) {
        self.wired_on.store(on, Ordering::SeqCst);
    }

    pub fn set_wireless_on(&self, on: bool) {
        self.wireless_on.store(on, Ordering::SeqCst);
    }

    pub fn set_now_ms(&self, now: u64) {
        self.now_ms.store(now, Ordering::SeqCst);
    }

    /// Last state the wired channel was switched to.
    pub fn wired_channel(&self) -> Option<WiredChannel> {
        *self.wired_channel.lock().unwrap()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Platform for FakePlatform {
    fn set_enable_line(&self, high: bool) {
        self.enable_line.store(high, Ordering::SeqCst);
    }

    fn set_sleep_enable_line(&self, high: bool) {
        self.sleep_enable_line.store(high, Ordering::SeqCst);
    }

    fn interrupt_line_asserted(&self) -> bool {
        !self.model.lock().unwrap().status().is_empty()
    }

    fn enable_irq(&self) {
        self.enable_count.fetch_add(1, Ordering::SeqCst);
    }

    fn disable_irq(&self) {
        self.disable_count.fetch_add(1, Ordering::SeqCst);
    }

    fn wired_channel_on(&self) -> bool {
        self.wired_on.load(Ordering::SeqCst)
    }

    fn set_wired_channel(&self, state: WiredChannel) {
        *self.wired_channel.lock().unwrap() = Some(state);
    }

    fn wireless_channel_on(&self) -> bool {
        self.wireless_on.load(Ordering::SeqCst)
    }

    fn notify(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub type TestReceiver = Idtp9221<FakeBus, TestDelay, &'static FakePlatform>;

/// A driver wired to a fresh chip model
pub struct Harness {
    pub model: Arc<Mutex<ChipModel>>,
    pub platform: &'static FakePlatform,
    pub delay: TestDelay,
    pub rx: &'static TestReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let model = ChipModel::shared();
        let platform: &'static FakePlatform =
            Box::leak(Box::new(FakePlatform::new(model.clone())));
        let delay = TestDelay::new();
        let rx: &'static TestReceiver = Box::leak(Box::new(Idtp9221::new(
            FakeBus::new(model.clone()),
            delay.clone(),
            platform,
            config,
        )));

        Self {
            model,
            platform,
            delay,
            rx,
        }
    }

    /// Services the interrupt on every sleep, after the transmitter had its
    /// say.
    pub fn attach_worker(&self) {
        let model = self.model.clone();
        let rx = self.rx;
        self.delay.set_hook(move || {
            model.lock().unwrap().tick();
            if rx.on_interrupt() {
                rx.service_interrupt();
            }
        });
    }
}
