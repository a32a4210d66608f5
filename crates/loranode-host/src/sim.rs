//! Simulated hardware for running the pipelines on a desktop
//!
//! Everything runs on one thread against a virtual clock: delays advance the
//! clock instantly, so hours of device time pass in seconds.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, InputPin};
use log::debug;
use loranode_core::modem::BUSY_MARKER;
use loranode_core::sensors::{MAX_DISTANCE_CM, Sensor, SensorError, TemperatureReading};
use loranode_core::time::Clock;

/// Shared virtual time in microseconds.
#[derive(Clone, Default)]
pub struct SimClock {
    now_us: Rc<Cell<u64>>,
}

impl SimClock {
    pub fn delay(&self) -> SimDelay {
        SimDelay {
            clock: self.clone(),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_us.set(self.now_us.get() + ms * 1_000);
    }

    fn secs(&self) -> f64 {
        self.now_us.get() as f64 / 1_000_000.0
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.now_us.get()
    }
}

#[derive(Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let us = u64::from(ns).div_ceil(1_000);
        self.clock.now_us.set(self.clock.now_us.get() + us);
    }
}

#[derive(Default)]
struct ModemLine {
    tx: Vec<u8>,
    rx: VecDeque<u8>,
    commands: u32,
    uplinks: Vec<String>,
    busy_replies: u32,
    busy_last: bool,
}

/// Modem answering `OK`, and `BUSY` to every `busy_every`-th command (never
/// twice in a row).
#[derive(Clone)]
pub struct SimulatedModem {
    line: Rc<RefCell<ModemLine>>,
    busy_every: u32,
}

impl SimulatedModem {
    pub fn new(busy_every: u32) -> Self {
        Self {
            line: Rc::default(),
            busy_every,
        }
    }

    /// `AT+SENDB` / `AT+SEND` commands accepted so far.
    pub fn uplinks(&self) -> Vec<String> {
        self.line.borrow().uplinks.clone()
    }

    pub fn busy_replies(&self) -> u32 {
        self.line.borrow().busy_replies
    }

    pub fn commands(&self) -> u32 {
        self.line.borrow().commands
    }
}

impl embedded_io::ErrorType for SimulatedModem {
    type Error = Infallible;
}

impl embedded_io_async::Write for SimulatedModem {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.line.borrow_mut().tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Infallible> {
        let mut line = self.line.borrow_mut();
        let command = String::from_utf8_lossy(&std::mem::take(&mut line.tx))
            .trim_end()
            .to_owned();
        line.commands += 1;

        let busy = self.busy_every > 0 && line.commands % self.busy_every == 0 && !line.busy_last;
        line.busy_last = busy;
        let reply = if busy {
            line.busy_replies += 1;
            format!("AT_{BUSY_MARKER}_ERROR\r\n")
        } else if command == "AT+DADDR=?" {
            "26:0B:1A:2C\r\nOK\r\n".to_owned()
        } else {
            if command.starts_with("AT+SEND") {
                line.uplinks.push(command.clone());
            }
            "OK\r\n".to_owned()
        };
        debug!("modem: {} -> {}", command, reply.trim_end());
        line.rx.extend(reply.bytes());
        Ok(())
    }
}

impl embedded_io_async::Read for SimulatedModem {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut line = self.line.borrow_mut();
        let n = buf.len().min(line.rx.len());
        for (slot, byte) in buf.iter_mut().zip(line.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for SimulatedModem {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.line.borrow().rx.is_empty())
    }
}

#[derive(Debug)]
pub struct OutOfRange;

/// Flash image in memory, erased to 0xFF.
pub struct RamFlash {
    data: Vec<u8>,
}

impl RamFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
        }
    }
}

impl embedded_storage::ReadStorage for RamFlash {
    type Error = OutOfRange;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), OutOfRange> {
        let start = offset as usize;
        let src = self
            .data
            .get(start..start + bytes.len())
            .ok_or(OutOfRange)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl embedded_storage::Storage for RamFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), OutOfRange> {
        let start = offset as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(OutOfRange)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

/// Temperature drifting around 23 °C, with an occasional CRC failure.
pub struct SyntheticThermometer {
    clock: SimClock,
    reads: u32,
}

impl SyntheticThermometer {
    /// Every n-th read fails.
    const FAIL_EVERY: u32 = 50;

    pub fn new(clock: SimClock) -> Self {
        Self { clock, reads: 0 }
    }
}

impl Sensor for SyntheticThermometer {
    type Reading = TemperatureReading;

    async fn read(&mut self) -> Result<TemperatureReading, SensorError> {
        self.reads += 1;
        if self.reads % Self::FAIL_EVERY == 0 {
            return Err(SensorError::CrcMismatch { sensor: "DS18B20" });
        }
        let t = self.clock.secs();
        let celsius = 23.0 + 3.0 * (t / 1_200.0).sin() + 0.5 * (t / 97.0).cos();
        Ok(TemperatureReading {
            sixteenths: (celsius * 16.0) as i16,
        })
    }
}

/// Bin fill level slowly rising, with measurement noise.
pub struct SyntheticRangefinder {
    clock: SimClock,
}

impl SyntheticRangefinder {
    pub fn new(clock: SimClock) -> Self {
        Self { clock }
    }
}

impl Sensor for SyntheticRangefinder {
    type Reading = u16;

    async fn read(&mut self) -> Result<u16, SensorError> {
        let t = self.clock.secs();
        let level = 180.0 - (t / 3_600.0) * 10.0 + 2.0 * (t * 7.0).sin();
        Ok(level.clamp(2.0, f64::from(MAX_DISTANCE_CM)) as u16)
    }
}

/// Tamper switch held open (high) until a virtual deadline.
#[derive(Clone)]
pub struct SimTamperSwitch {
    clock: SimClock,
    open_until_us: Rc<Cell<u64>>,
}

impl SimTamperSwitch {
    pub fn new(clock: SimClock) -> Self {
        Self {
            clock,
            open_until_us: Rc::default(),
        }
    }

    pub fn open_for_ms(&self, ms: u64) {
        self.open_until_us.set(self.clock.now_us() + ms * 1_000);
    }
}

impl ErrorType for SimTamperSwitch {
    type Error = Infallible;
}

impl InputPin for SimTamperSwitch {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.clock.now_us() < self.open_until_us.get())
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Periodic pulse train on one counter input, with contact bounce.
pub struct PulseSource {
    pub period_ms: i64,
    pub bounce_ms: Option<i64>,
    next_ms: i64,
}

impl PulseSource {
    pub fn new(period_ms: i64, bounce_ms: Option<i64>) -> Self {
        Self {
            period_ms,
            bounce_ms,
            next_ms: period_ms,
        }
    }

    /// Edge timestamps due up to `now_ms`, bounces included.
    pub fn edges_until(&mut self, now_ms: i64) -> Vec<i64> {
        let mut edges = Vec::new();
        while self.next_ms <= now_ms {
            edges.push(self.next_ms);
            if let Some(bounce) = self.bounce_ms {
                edges.push(self.next_ms + bounce);
            }
            self.next_ms += self.period_ms;
        }
        edges
    }

    /// Real pulses (bounces excluded) emitted so far.
    pub fn pulses(&self) -> u32 {
        ((self.next_ms - self.period_ms) / self.period_ms) as u32
    }
}
