pub mod ds18b20;
pub mod hcsr04;
pub mod onewire;
pub mod powered;

use core::future::Future;

use thiserror_no_std::Error;

pub use ds18b20::{Ds18b20, TemperatureReading};
pub use hcsr04::{HcSr04, MAX_DISTANCE_CM};
pub use onewire::{OneWireBus, OneWirePin};
pub use powered::PoweredSensor;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed: {details}")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: timed out during {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: checksum mismatch")]
    CrcMismatch { sensor: &'static str },
}

/// Trait for sensors producing one typed reading per call.
pub trait Sensor {
    type Reading;

    fn read(&mut self) -> impl Future<Output = Result<Self::Reading, SensorError>>;
}
