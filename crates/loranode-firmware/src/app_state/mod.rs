//! Firmware-side wiring of the loranode core
//!
//! Selects the device variant from cargo features and provides the hardware
//! bring-up helpers used by the binary.

mod counters;
mod hardware;

pub use counters::*;
pub use hardware::*;

use loranode_core::InitError;
use loranode_core::config::{ConfigError, DeviceConfig};
use loranode_core::sensors::SensorError;
use loranode_core::storage::StoreError;
use thiserror_no_std::Error;

use crate::credentials;

// The pulse counter is the fallback when neither other variant is enabled
#[cfg(all(feature = "variant-temperature", feature = "variant-tamper"))]
compile_error!("variant-temperature and variant-tamper are mutually exclusive");

/// Failures during boot. The binary restarts the device on any of them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("wiring failed: {0}")]
    Init(#[from] InitError),
    #[error("counter storage unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("sensor unavailable: {0}")]
    Sensor(#[from] SensorError),
    #[error("modem UART could not be configured")]
    Uart,
}

/// Configuration of the variant this image was built for.
pub fn device_config() -> Result<DeviceConfig<'static>, BootError> {
    #[cfg(feature = "variant-temperature")]
    let config = DeviceConfig::temperature(credentials::lorawan());
    #[cfg(feature = "variant-tamper")]
    let config = DeviceConfig::tamper(credentials::lorawan());
    #[cfg(not(any(feature = "variant-temperature", feature = "variant-tamper")))]
    let config = DeviceConfig::pulse_counter(credentials::lorawan());

    config.validate()?;
    Ok(config)
}
