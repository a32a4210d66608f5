//! Test doubles shared by the unit tests of this crate.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::convert::Infallible;

use crate::config::{Confirmation, DataRate, DeviceClass, JoinMode, LoRaWanConfig};
use crate::modem::{Uplink, UplinkError};
use crate::sensors::{Sensor, SensorError};
use crate::time::{Clock, Watchdog};

/// ABP credentials of a test device.
pub fn credentials() -> LoRaWanConfig<'static> {
    LoRaWanConfig {
        device_address: "260B1A2C",
        app_eui: "70B3D57ED0000001",
        app_session_key: "2B7E151628AED2A6ABF7158809CF4F3C",
        network_session_key: "2B7E151628AED2A6ABF7158809CF4F3D",
        channel_mask: None,
        join_mode: JoinMode::Abp,
        adaptive_data_rate: false,
        data_rate: DataRate::DR2,
        class: DeviceClass::A,
        confirmation: Confirmation::Unconfirmed,
        port: 1,
    }
}

/// Virtual monotonic time shared between a clock and any number of delays.
///
/// Delays advance the time instantly, so multi-second backoffs cost nothing.
#[derive(Clone, Default)]
pub struct VirtualTime {
    now_ns: Rc<Cell<u64>>,
}

impl VirtualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(&self) -> VirtualDelay {
        VirtualDelay { time: self.clone() }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ns.set(self.now_ns.get() + ms * 1_000_000);
    }

    pub fn advance_us(&self, us: u64) {
        self.now_ns.set(self.now_ns.get() + us * 1_000);
    }

    pub fn now_ms(&self) -> i64 {
        (self.now_ns.get() / 1_000_000) as i64
    }
}

impl Clock for VirtualTime {
    fn now_us(&self) -> u64 {
        self.now_ns.get() / 1_000
    }
}

#[derive(Clone)]
pub struct VirtualDelay {
    time: VirtualTime,
}

impl embedded_hal_async::delay::DelayNs for VirtualDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let now = self.time.now_ns.get();
        self.time.now_ns.set(now + u64::from(ns));
    }
}

impl embedded_hal::delay::DelayNs for VirtualDelay {
    fn delay_ns(&mut self, ns: u32) {
        let now = self.time.now_ns.get();
        self.time.now_ns.set(now + u64::from(ns));
    }
}

/// Watchdog that counts how often it was fed.
#[derive(Clone, Default)]
pub struct CountingWatchdog {
    feeds: Rc<Cell<usize>>,
}

impl CountingWatchdog {
    pub fn feeds(&self) -> usize {
        self.feeds.get()
    }
}

impl Watchdog for CountingWatchdog {
    fn feed(&mut self) {
        self.feeds.set(self.feeds.get() + 1);
    }
}

#[derive(Default)]
struct SerialState {
    written: Vec<u8>,
    commands: Vec<String>,
    script: VecDeque<Vec<u8>>,
    rx: VecDeque<u8>,
}

/// Serial port answering each flushed command with the next scripted reply.
///
/// Once the script is exhausted the modem stays silent.
#[derive(Clone, Default)]
pub struct ScriptedSerial {
    state: Rc<RefCell<SerialState>>,
}

impl ScriptedSerial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, response: &str) -> &Self {
        self.state
            .borrow_mut()
            .script
            .push_back(response.as_bytes().to_vec());
        self
    }

    /// Commands written so far, terminators included.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }
}

impl embedded_io::ErrorType for ScriptedSerial {
    type Error = Infallible;
}

impl embedded_io_async::Write for ScriptedSerial {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.state.borrow_mut().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let written = core::mem::take(&mut state.written);
        state
            .commands
            .push(String::from_utf8_lossy(&written).into_owned());
        if let Some(reply) = state.script.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }
}

impl embedded_io_async::Read for ScriptedSerial {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state.borrow_mut();
        let mut n = 0;
        while n < buf.len() {
            match state.rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for ScriptedSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.state.borrow().rx.is_empty())
    }
}

#[derive(Default)]
struct UplinkLog {
    configured: usize,
    sent: Vec<(u8, Vec<u8>)>,
    fail_sends: bool,
}

/// Uplink keeping every payload it was handed.
#[derive(Clone, Default)]
pub struct RecordingUplink {
    log: Rc<RefCell<UplinkLog>>,
}

impl RecordingUplink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(u8, Vec<u8>)> {
        self.log.borrow().sent.clone()
    }

    pub fn configured(&self) -> usize {
        self.log.borrow().configured
    }

    /// Make every following send report a modem failure.
    pub fn fail_sends(&self) {
        self.log.borrow_mut().fail_sends = true;
    }
}

impl Uplink for RecordingUplink {
    async fn configure(&mut self, _config: &LoRaWanConfig<'_>) -> Result<(), UplinkError> {
        self.log.borrow_mut().configured += 1;
        Ok(())
    }

    async fn send_payload(&mut self, port: u8, payload: &[u8]) -> Result<(), UplinkError> {
        let mut log = self.log.borrow_mut();
        log.sent.push((port, payload.to_vec()));
        if log.fail_sends {
            return Err(UplinkError::Modem(crate::modem::ModemError::Serial(
                embedded_io::ErrorKind::TimedOut,
            )));
        }
        Ok(())
    }
}

/// Sensor replaying scripted results, then a steady fallback reading.
#[derive(Clone)]
pub struct ScriptedSensor<R> {
    script: Rc<RefCell<VecDeque<Result<R, SensorError>>>>,
    fallback: R,
    reads: Rc<Cell<usize>>,
}

impl<R: Copy> ScriptedSensor<R> {
    pub fn new(fallback: R) -> Self {
        Self {
            script: Rc::default(),
            fallback,
            reads: Rc::default(),
        }
    }

    pub fn then(&self, result: Result<R, SensorError>) -> &Self {
        self.script.borrow_mut().push_back(result);
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl<R: Copy> Sensor for ScriptedSensor<R> {
    type Reading = R;

    async fn read(&mut self) -> Result<R, SensorError> {
        self.reads.set(self.reads.get() + 1);
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or(Ok(self.fallback))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds;

/// Byte-addressable flash image held in RAM, erased to 0xFF.
#[derive(Clone)]
pub struct RamFlash {
    pub data: Vec<u8>,
}

impl RamFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: alloc::vec![0xFF; size],
        }
    }
}

impl embedded_storage::ReadStorage for RamFlash {
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let src = self
            .data
            .get(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl embedded_storage::Storage for RamFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}
