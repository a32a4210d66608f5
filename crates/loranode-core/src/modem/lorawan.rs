//! ABP setup and uplinks on top of [`ModemDriver`]

use embedded_hal_async::delay::DelayNs;
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};
use log::{error, info};

use super::{AtCommand, ModemDriver, ModemError, ModemResponse, Uplink, UplinkError};
use crate::config::{LoRaWanConfig, ModemTiming};
use crate::payload::MAX_PAYLOAD_BYTES;
use crate::time::Watchdog;

pub struct LoRaWanModem<S, D, W> {
    driver: ModemDriver<S, D, W>,
}

impl<S, D, W> LoRaWanModem<S, D, W>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    W: Watchdog,
{
    pub fn new(serial: S, delay: D, watchdog: W, timing: ModemTiming) -> Self {
        Self {
            driver: ModemDriver::new(serial, delay, watchdog, timing),
        }
    }

    async fn exec(&mut self, command: AtCommand<'_>) -> Result<ModemResponse, ModemError> {
        let line = command.format(self.driver.timing().line_ending);
        self.driver.send_command(line.as_bytes()).await
    }

    /// Wake and reset the modem, then program the ABP session.
    pub async fn configure(&mut self, config: &LoRaWanConfig<'_>) -> Result<(), ModemError> {
        info!("Configuring LoRaWAN modem...");

        self.exec(AtCommand::Attention).await?;
        self.exec(AtCommand::Reset).await?;
        let settle = self.driver.timing().reset_settle_ms;
        self.driver.pause_ms(settle).await;

        if let Some(mask) = config.channel_mask {
            self.exec(AtCommand::ChannelMask(mask)).await?;
        }
        self.exec(AtCommand::JoinMode(config.join_mode)).await?;
        self.exec(AtCommand::DeviceAddress(config.device_address))
            .await?;
        let readback = self.exec(AtCommand::QueryDeviceAddress).await?;
        info!("Modem reports device address {}", readback);
        self.exec(AtCommand::AppEui(config.app_eui)).await?;
        self.exec(AtCommand::AppSessionKey(config.app_session_key))
            .await?;
        self.exec(AtCommand::NetworkSessionKey(config.network_session_key))
            .await?;
        self.exec(AtCommand::AdaptiveDataRate(config.adaptive_data_rate))
            .await?;
        self.exec(AtCommand::DataRate(config.data_rate)).await?;
        self.exec(AtCommand::Class(config.class)).await?;
        self.exec(AtCommand::Confirmation(config.confirmation))
            .await?;

        info!("LoRaWAN modem configured");
        Ok(())
    }

    /// Send `payload` as a binary uplink on `port`.
    ///
    /// Payloads over [`MAX_PAYLOAD_BYTES`] are refused before anything is
    /// written to the serial line.
    pub async fn send_binary(&mut self, port: u8, payload: &[u8]) -> Result<(), UplinkError> {
        check_len(payload.len())?;
        self.exec(AtCommand::SendBinary { port, payload }).await?;
        Ok(())
    }

    /// Send `text` as a text uplink on `port`.
    pub async fn send_text(&mut self, port: u8, text: &str) -> Result<(), UplinkError> {
        check_len(text.len())?;
        self.exec(AtCommand::SendText { port, text }).await?;
        Ok(())
    }

    pub fn driver(&self) -> &ModemDriver<S, D, W> {
        &self.driver
    }

    pub fn into_driver(self) -> ModemDriver<S, D, W> {
        self.driver
    }
}

fn check_len(len: usize) -> Result<(), UplinkError> {
    if len > MAX_PAYLOAD_BYTES {
        error!(
            "Payload of {} bytes exceeds {} bytes, not sending",
            len, MAX_PAYLOAD_BYTES
        );
        return Err(UplinkError::PayloadTooLarge {
            len,
            max: MAX_PAYLOAD_BYTES,
        });
    }
    Ok(())
}

impl<S, D, W> Uplink for LoRaWanModem<S, D, W>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    W: Watchdog,
{
    async fn configure(&mut self, config: &LoRaWanConfig<'_>) -> Result<(), UplinkError> {
        LoRaWanModem::configure(self, config).await?;
        Ok(())
    }

    async fn send_payload(&mut self, port: u8, payload: &[u8]) -> Result<(), UplinkError> {
        self.send_binary(port, payload).await
    }
}
