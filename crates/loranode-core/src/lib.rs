//! Hardware-independent core library for loranode
//!
//! This crate contains all platform-agnostic logic for the loranode family of
//! LoRaWAN sensor devices: debounced pulse counting, sample buffering and
//! statistics, the AT-command modem driver, payload encoding, the
//! transmission scheduler, counter persistence and sensor drivers written
//! against the `embedded-hal` traits.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32) and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod config;
pub mod counter;
pub mod handoff;
pub mod modem;
pub mod payload;
pub mod pipelines;
pub mod samples;
pub mod scheduler;
pub mod sensors;
pub mod storage;
pub mod time;

#[cfg(test)]
pub(crate) mod testing;

use thiserror_no_std::Error;

/// Errors raised while wiring the device at boot.
///
/// These are never retried: the binary restarts the whole device.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("no handoff cell available for input line {0}")]
    HandoffUnavailable(u8),
    #[error("input line {0} registered twice")]
    DuplicateLine(u8),
    #[error("sensor {0} not found during bus scan")]
    SensorMissing(&'static str),
}
