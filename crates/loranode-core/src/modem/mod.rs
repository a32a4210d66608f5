//! LoRaWAN modem over a serial AT-command link
//!
//! - [`at`]: formatting of individual AT commands into a bounded buffer
//! - [`driver`]: the request/response exchange with BUSY retry
//! - [`lorawan`]: credential setup and uplinks built on top of the driver

pub mod at;
pub mod driver;
pub mod lorawan;

use core::future::Future;

use embedded_io::ErrorKind;
use thiserror_no_std::Error;

use crate::config::LoRaWanConfig;

pub use at::{AtCommand, COMMAND_CAPACITY, CommandBuffer, LineEnding};
pub use driver::{ModemDriver, ModemResponse, ModemState, RESPONSE_CAPACITY};
pub use lorawan::LoRaWanModem;

/// Marker the modem puts in a response when it cannot take a command yet.
pub const BUSY_MARKER: &str = "BUSY";

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    #[error("serial transport failed: {0:?}")]
    Serial(ErrorKind),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UplinkError {
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("modem exchange failed: {0}")]
    Modem(#[from] ModemError),
}

/// A LoRaWAN link the pipelines report through.
///
/// A returned `Ok` only means the modem accepted the command; whether the
/// frame reached a gateway is not known at this layer.
pub trait Uplink {
    /// Program the session credentials into the radio.
    fn configure(
        &mut self,
        config: &LoRaWanConfig<'_>,
    ) -> impl Future<Output = Result<(), UplinkError>>;

    fn send_payload(
        &mut self,
        port: u8,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), UplinkError>>;
}
