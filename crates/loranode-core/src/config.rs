//! Device configuration
//!
//! Credentials are borrowed strings so a provisioning blob can be decoded in
//! place with postcard, or the firmware can point at `env!` constants baked in
//! at build time. Everything here is write-once at boot.

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::counter::DEFAULT_DEBOUNCE_WINDOW_MS;
use crate::modem::LineEnding;
use crate::scheduler::TransmitGate;

/// Highest data rate index accepted by `AT+DR`.
pub const MAX_DATA_RATE: u8 = 6;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("data rate {0} outside 0..=6")]
    DataRateOutOfRange(u8),
    #[error("uplink port {0} outside 1..=223")]
    PortOutOfRange(u8),
    #[error("{field} is not a hex string")]
    InvalidHex { field: &'static str },
    #[error("{field} must not be zero")]
    ZeroInterval { field: &'static str },
    #[error("provisioning blob could not be decoded")]
    Decode,
}

/// LoRaWAN activation mode, `AT+NJM`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    Abp,
    Otaa,
}

impl JoinMode {
    pub fn code(self) -> u8 {
        match self {
            JoinMode::Abp => 0,
            JoinMode::Otaa => 1,
        }
    }
}

/// LoRaWAN device class, `AT+CLASS`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    A,
    C,
}

impl DeviceClass {
    pub fn letter(self) -> char {
        match self {
            DeviceClass::A => 'A',
            DeviceClass::C => 'C',
        }
    }
}

/// Uplink confirmation mode, `AT+CFM`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Unconfirmed,
    Confirmed,
}

impl Confirmation {
    pub fn code(self) -> u8 {
        match self {
            Confirmation::Unconfirmed => 0,
            Confirmation::Confirmed => 1,
        }
    }
}

/// Data rate index, 0..=6.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRate(u8);

impl DataRate {
    /// DR2, the rate every loranode variant ships with.
    pub const DR2: Self = Self(2);

    pub fn new(index: u8) -> Result<Self, ConfigError> {
        if index > MAX_DATA_RATE {
            return Err(ConfigError::DataRateOutOfRange(index));
        }
        Ok(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// ABP credentials and radio settings sent to the modem at boot.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct LoRaWanConfig<'a> {
    pub device_address: &'a str,
    pub app_eui: &'a str,
    pub app_session_key: &'a str,
    pub network_session_key: &'a str,
    /// Only sent when set; some modems ship with a usable default mask
    pub channel_mask: Option<&'a str>,
    pub join_mode: JoinMode,
    pub adaptive_data_rate: bool,
    pub data_rate: DataRate,
    pub class: DeviceClass,
    pub confirmation: Confirmation,
    pub port: u8,
}

impl LoRaWanConfig<'_> {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_hex("device_address", self.device_address)?;
        check_hex("app_eui", self.app_eui)?;
        check_hex("app_session_key", self.app_session_key)?;
        check_hex("network_session_key", self.network_session_key)?;
        if let Some(mask) = self.channel_mask {
            check_hex("channel_mask", mask)?;
        }
        DataRate::new(self.data_rate.index())?;
        if !(1..=223).contains(&self.port) {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        Ok(())
    }
}

// Modems accept colon separated byte groups as well as plain hex.
fn check_hex(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_hexdigit() || b == b':');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidHex { field })
    }
}

/// Timing of the serial exchange with the modem.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModemTiming {
    /// Wait between writing a command and reading its response
    pub inter_command_delay_ms: u32,
    /// Maximum time spent collecting a response
    pub response_timeout_ms: u32,
    /// Wait before re-sending a command the modem answered with BUSY
    pub busy_backoff_ms: u32,
    /// Wait after `ATZ` for the modem to reboot
    pub reset_settle_ms: u32,
    /// Step between two checks of the receive line
    pub poll_interval_ms: u32,
    pub line_ending: LineEnding,
}

impl Default for ModemTiming {
    fn default() -> Self {
        Self {
            inter_command_delay_ms: 1_000,
            response_timeout_ms: 1_000,
            busy_backoff_ms: 5_000,
            reset_settle_ms: 5_000,
            poll_interval_ms: 10,
            line_ending: LineEnding::Lf,
        }
    }
}

/// Sampling and transmission cadence.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// `None` for variants that do not sample into a buffer
    pub sample_interval_ms: Option<u32>,
    pub transmit_interval_ms: u32,
    pub burn_in_ms: Option<u32>,
    pub gate: TransmitGate,
    /// Persist counters on every K-th transmission
    pub checkpoint_every: u32,
    /// Wait before retrying a failed sensor read
    pub sensor_retry_ms: u32,
}

impl ScheduleConfig {
    /// Samples per transmission window (`transmit / sample`), at least 1.
    pub fn buffer_capacity(&self) -> usize {
        match self.sample_interval_ms {
            Some(sample) if sample > 0 => ((self.transmit_interval_ms / sample) as usize).max(1),
            _ => 1,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.transmit_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "transmit_interval_ms",
            });
        }
        if self.sample_interval_ms == Some(0) {
            return Err(ConfigError::ZeroInterval {
                field: "sample_interval_ms",
            });
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "checkpoint_every",
            });
        }
        Ok(())
    }
}

/// Settings of the one-shot tamper / distance wake cycle.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeConfig {
    pub sleep_secs: u32,
    /// Readings averaged for one distance report
    pub filter_window: usize,
    pub reading_interval_ms: u32,
    pub reading_retry_ms: u32,
    /// Wait after a tamper wake before watching for release
    pub release_settle_ms: u32,
    pub release_debounce_ms: u32,
    pub release_poll_ms: u32,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            sleep_secs: 1_800,
            filter_window: 100,
            reading_interval_ms: 100,
            reading_retry_ms: 1_000,
            release_settle_ms: 1_000,
            release_debounce_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            release_poll_ms: 10,
        }
    }
}

/// Complete configuration of one device.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct DeviceConfig<'a> {
    pub lorawan: LoRaWanConfig<'a>,
    pub timing: ModemTiming,
    pub schedule: ScheduleConfig,
    pub debounce_window_ms: u32,
    pub wake: WakeConfig,
}

impl<'a> DeviceConfig<'a> {
    /// Two-line pulse counter: transmits both counts every 15 s.
    pub fn pulse_counter(lorawan: LoRaWanConfig<'a>) -> Self {
        Self {
            lorawan: LoRaWanConfig { port: 12, ..lorawan },
            timing: ModemTiming::default(),
            schedule: ScheduleConfig {
                sample_interval_ms: None,
                transmit_interval_ms: 15_000,
                burn_in_ms: None,
                gate: TransmitGate::Always,
                checkpoint_every: 10,
                sensor_retry_ms: 10,
            },
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            wake: WakeConfig::default(),
        }
    }

    /// Temperature logger: 5 min burn-in, one sample every 10 s, one
    /// summary every 15 min.
    pub fn temperature(lorawan: LoRaWanConfig<'a>) -> Self {
        Self {
            lorawan: LoRaWanConfig { port: 12, ..lorawan },
            timing: ModemTiming::default(),
            schedule: ScheduleConfig {
                sample_interval_ms: Some(10_000),
                transmit_interval_ms: 900_000,
                burn_in_ms: Some(300_000),
                gate: TransmitGate::WhenBufferFull,
                checkpoint_every: 10,
                sensor_retry_ms: 1_000,
            },
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            wake: WakeConfig::default(),
        }
    }

    /// Tamper-triggered distance reporter waking every 30 min.
    pub fn tamper(lorawan: LoRaWanConfig<'a>) -> Self {
        Self {
            lorawan: LoRaWanConfig { port: 5, ..lorawan },
            timing: ModemTiming {
                line_ending: LineEnding::LfCr,
                ..ModemTiming::default()
            },
            schedule: ScheduleConfig {
                sample_interval_ms: None,
                transmit_interval_ms: 1_800_000,
                burn_in_ms: None,
                gate: TransmitGate::Always,
                checkpoint_every: 10,
                sensor_retry_ms: 1_000,
            },
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW_MS,
            wake: WakeConfig::default(),
        }
    }

    /// Decode a postcard provisioning blob; credentials borrow from `bytes`.
    pub fn from_postcard(bytes: &'a [u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lorawan.validate()?;
        self.schedule.validate()
    }
}
