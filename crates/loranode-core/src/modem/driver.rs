//! Request/response exchange with the modem
//!
//! ```text
//! Idle -> Sending -> AwaitingResponse -> Done
//!                          |
//!                          +-> BusyDetected -> Backoff -> Sending ...
//! ```
//!
//! A response containing `BUSY` makes the driver wait out the backoff and
//! re-send the very same command. There is no retry limit: the only bound on
//! a modem that stays busy is the watchdog, which is fed on every round.
//!
//! A silent modem is not an error. When nothing arrives within the response
//! timeout the exchange completes with an empty response.
//!
//! Responses longer than the buffer leave their tail in the UART. Anything
//! still pending when the next command goes out is read and dropped first,
//! so a stale fragment is never taken for the new command's answer.

use core::fmt;

use embedded_hal_async::delay::DelayNs;
use embedded_io::{Error as _, ReadReady};
use embedded_io_async::{Read, Write};
use heapless::Vec;
use log::{error, info, warn};

use super::{BUSY_MARKER, ModemError};
use crate::config::ModemTiming;
use crate::time::Watchdog;

/// Bytes kept from a single response; anything beyond is left unread.
pub const RESPONSE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemState {
    Idle,
    Sending,
    AwaitingResponse,
    BusyDetected,
    Backoff,
    Done,
}

/// Raw bytes the modem answered with, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModemResponse {
    bytes: Vec<u8, RESPONSE_CAPACITY>,
}

impl ModemResponse {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Longest valid UTF-8 prefix of the response.
    pub fn as_str(&self) -> &str {
        match core::str::from_utf8(&self.bytes) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&self.bytes[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn contains(&self, marker: &str) -> bool {
        let marker = marker.as_bytes();
        !marker.is_empty() && self.bytes.windows(marker.len()).any(|w| w == marker)
    }
}

/// Trimmed text, or the raw bytes in hex when the modem sent garbage.
impl fmt::Display for ModemResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match core::str::from_utf8(&self.bytes) {
            Ok(text) => f.write_str(text.trim()),
            Err(_) => write!(f, "{:02X?}", self.bytes.as_slice()),
        }
    }
}

/// Serial session with the modem.
pub struct ModemDriver<S, D, W> {
    serial: S,
    delay: D,
    watchdog: W,
    timing: ModemTiming,
    state: ModemState,
    busy_retries: u32,
}

impl<S, D, W> ModemDriver<S, D, W>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
    W: Watchdog,
{
    pub fn new(serial: S, delay: D, watchdog: W, timing: ModemTiming) -> Self {
        Self {
            serial,
            delay,
            watchdog,
            timing,
            state: ModemState::Idle,
            busy_retries: 0,
        }
    }

    /// Send `command` verbatim and return the modem's answer.
    ///
    /// Loops until the answer does not contain `BUSY`.
    pub async fn send_command(&mut self, command: &[u8]) -> Result<ModemResponse, ModemError> {
        self.busy_retries = 0;
        loop {
            self.state = ModemState::Sending;
            self.discard_pending().await?;
            info!(
                "AT >> {}",
                core::str::from_utf8(command).unwrap_or("<binary>").trim_end()
            );
            self.serial
                .write_all(command)
                .await
                .map_err(|e| ModemError::Serial(e.kind()))?;
            self.serial
                .flush()
                .await
                .map_err(|e| ModemError::Serial(e.kind()))?;

            self.state = ModemState::AwaitingResponse;
            self.delay.delay_ms(self.timing.inter_command_delay_ms).await;
            self.watchdog.feed();

            let response = self.read_response().await?;

            if response.contains(BUSY_MARKER) {
                self.state = ModemState::BusyDetected;
                error!(
                    "Modem BUSY: {}. Retrying in {} ms",
                    response,
                    self.timing.busy_backoff_ms
                );
                self.busy_retries += 1;
                self.state = ModemState::Backoff;
                self.delay.delay_ms(self.timing.busy_backoff_ms).await;
                self.watchdog.feed();
                continue;
            }

            if response.is_empty() {
                info!("AT << (no response)");
            } else {
                info!("AT << {}", response);
            }
            self.state = ModemState::Done;
            return Ok(response);
        }
    }

    /// Collect whatever arrives until the buffer is full or the response
    /// timeout elapses.
    /// Drop bytes left over from an earlier response.
    async fn discard_pending(&mut self) -> Result<(), ModemError> {
        let mut chunk = [0u8; 32];
        let mut dropped = 0;
        while self
            .serial
            .read_ready()
            .map_err(|e| ModemError::Serial(e.kind()))?
        {
            let n = self
                .serial
                .read(&mut chunk)
                .await
                .map_err(|e| ModemError::Serial(e.kind()))?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        if dropped > 0 {
            warn!("Dropped {} stale bytes from the modem", dropped);
        }
        Ok(())
    }

    async fn read_response(&mut self) -> Result<ModemResponse, ModemError> {
        let mut response = ModemResponse::default();
        let mut chunk = [0u8; 32];
        let mut waited_ms = 0;

        loop {
            while self
                .serial
                .read_ready()
                .map_err(|e| ModemError::Serial(e.kind()))?
            {
                let room = RESPONSE_CAPACITY - response.bytes.len();
                if room == 0 {
                    return Ok(response);
                }
                let want = room.min(chunk.len());
                let n = self
                    .serial
                    .read(&mut chunk[..want])
                    .await
                    .map_err(|e| ModemError::Serial(e.kind()))?;
                if n == 0 {
                    break;
                }
                // Cannot fail, `want` never exceeds the remaining room
                let _ = response.bytes.extend_from_slice(&chunk[..n]);
            }

            if waited_ms >= self.timing.response_timeout_ms {
                return Ok(response);
            }
            let step = self.timing.poll_interval_ms.max(1);
            self.delay.delay_ms(step).await;
            waited_ms += step;
        }
    }

    /// Sleep on the driver's delay, feeding the watchdog afterwards.
    pub async fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms).await;
        self.watchdog.feed();
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    /// BUSY answers seen during the last [`send_command`](Self::send_command).
    pub fn last_busy_retries(&self) -> u32 {
        self.busy_retries
    }

    pub fn timing(&self) -> &ModemTiming {
        &self.timing
    }

    pub fn release(self) -> (S, D, W) {
        (self.serial, self.delay, self.watchdog)
    }
}
