//! Doubles shared by the integration tests: virtual time, a modem speaking
//! the AT protocol over a fake serial line, and flash held in RAM.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use loranode_core::config::{Confirmation, DataRate, DeviceClass, JoinMode, LoRaWanConfig};
use loranode_core::time::Clock;

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

#[derive(Clone, Default)]
pub struct SimTime {
    now_ns: Rc<Cell<u64>>,
}

impl SimTime {
    pub fn delay(&self) -> SimDelay {
        SimDelay { time: self.clone() }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.now_ns.set(self.now_ns.get() + ms * 1_000_000);
    }
}

impl Clock for SimTime {
    fn now_us(&self) -> u64 {
        self.now_ns.get() / 1_000
    }
}

#[derive(Clone)]
pub struct SimDelay {
    time: SimTime,
}

impl embedded_hal_async::delay::DelayNs for SimDelay {
    async fn delay_ns(&mut self, ns: u32) {
        let now = self.time.now_ns.get();
        self.time.now_ns.set(now + u64::from(ns));
    }
}

#[derive(Default)]
struct ModemState {
    line: Vec<u8>,
    commands: Vec<String>,
    busy_replies: usize,
    rx: VecDeque<u8>,
}

/// Modem answering `OK` to every command, or `BUSY` while busy replies are
/// queued.
#[derive(Clone, Default)]
pub struct FakeModem {
    state: Rc<RefCell<ModemState>>,
}

impl FakeModem {
    /// Answer the next `n` commands with `BUSY`.
    pub fn busy_for(&self, n: usize) {
        self.state.borrow_mut().busy_replies = n;
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    pub fn uplinks(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("AT+SENDB="))
            .collect()
    }
}

impl embedded_io::ErrorType for FakeModem {
    type Error = Infallible;
}

impl embedded_io_async::Write for FakeModem {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        self.state.borrow_mut().line.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Infallible> {
        let mut state = self.state.borrow_mut();
        let line = std::mem::take(&mut state.line);
        state
            .commands
            .push(String::from_utf8_lossy(&line).into_owned());
        let reply: &[u8] = if state.busy_replies > 0 {
            state.busy_replies -= 1;
            b"AT_BUSY_ERROR\r\n"
        } else {
            b"OK\r\n"
        };
        state.rx.extend(reply);
        Ok(())
    }
}

impl embedded_io_async::Read for FakeModem {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let mut state = self.state.borrow_mut();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io::ReadReady for FakeModem {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        Ok(!self.state.borrow().rx.is_empty())
    }
}

#[derive(Debug)]
pub struct OutOfBounds;

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
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), OutOfBounds> {
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
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), OutOfBounds> {
        let start = offset as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}
