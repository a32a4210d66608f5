//! Uplink payload layouts
//!
//! All multi-byte fields are little-endian.

use core::fmt::Write;

use heapless::String;

use crate::samples::SampleRingBuffer;

/// Largest payload accepted for a single uplink.
pub const MAX_PAYLOAD_BYTES: usize = 80;

/// Scale applied to the standard deviation before it is packed.
pub const STDDEV_SCALE: u32 = 10;

/// Two pulse counters as 8 bytes: `c1` LE then `c2` LE.
pub fn encode_pulse_counts(counter_1: u32, counter_2: u32) -> [u8; 8] {
    let mut out = [0u8; 8];
    out[..4].copy_from_slice(&counter_1.to_le_bytes());
    out[4..].copy_from_slice(&counter_2.to_le_bytes());
    out
}

/// Summary of one transmission window of temperature samples, whole °C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureSummary {
    pub mean: i8,
    pub max: i8,
    pub min: i8,
    /// Population standard deviation × 10, saturated to `i8`
    pub stddev_x10: i8,
}

impl TemperatureSummary {
    /// Summarise a full buffer; `None` while it is still filling.
    pub fn from_buffer(buffer: &SampleRingBuffer<i8>) -> Option<Self> {
        let stddev = buffer.stddev_scaled(STDDEV_SCALE)?;
        Some(Self {
            mean: buffer.mean()?,
            max: buffer.max()?,
            min: buffer.min()?,
            stddev_x10: i8::try_from(stddev).unwrap_or(i8::MAX),
        })
    }

    /// `[mean, max, min, stddev×10]` as two's complement bytes.
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            self.mean as u8,
            self.max as u8,
            self.min as u8,
            self.stddev_x10 as u8,
        ]
    }
}

/// Why the tamper device woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WakeReason {
    Tamper = 0x01,
    Timer = 0x02,
    Unknown = 0x03,
}

impl WakeReason {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Reason from the wake sources reported by the sleep controller.
    /// A tamper wake takes precedence over a timer wake.
    pub fn from_sources(tamper: bool, timer: bool) -> Self {
        match (tamper, timer) {
            (true, _) => WakeReason::Tamper,
            (false, true) => WakeReason::Timer,
            (false, false) => WakeReason::Unknown,
        }
    }
}

/// Report of one tamper-device wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeReport {
    pub distance_cm: u16,
    pub reason: WakeReason,
}

impl WakeReport {
    /// `[distance_cm, reason]`; distances above 255 cm saturate.
    pub fn to_bytes(&self) -> [u8; 2] {
        [
            u8::try_from(self.distance_cm).unwrap_or(u8::MAX),
            self.reason.code(),
        ]
    }

    /// The two bytes as `%02X%02X` text.
    pub fn to_hex(&self) -> String<4> {
        let mut out = String::new();
        for byte in self.to_bytes() {
            // Exactly four characters, always fits
            let _ = write!(out, "{byte:02X}");
        }
        out
    }
}
