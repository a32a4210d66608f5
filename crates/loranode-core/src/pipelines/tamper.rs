//! Tamper / distance reporter variant
//!
//! The device spends its life in deep sleep. Each wake-up (timer or tamper
//! switch) runs one [`WakeCycle`]: wait for the tamper switch to be released,
//! configure the modem, take one filtered distance reading, report it and
//! hand back a [`SleepPlan`] for the firmware to enter deep sleep with.

use core::fmt::Debug;

use embedded_hal::digital::InputPin;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::config::{DeviceConfig, WakeConfig};
use crate::modem::Uplink;
use crate::payload::{WakeReason, WakeReport};
use crate::samples::{BufferMode, SampleRingBuffer};
use crate::sensors::Sensor;
use crate::time::Watchdog;

/// Moving average over the last `filter_window` distance readings.
pub struct DistanceFilter<S> {
    sensor: S,
    window: SampleRingBuffer<u16>,
    reading_interval_ms: u32,
    retry_ms: u32,
}

impl<S: Sensor<Reading = u16>> DistanceFilter<S> {
    pub fn new(sensor: S, config: &WakeConfig) -> Self {
        Self {
            sensor,
            window: SampleRingBuffer::new(config.filter_window, BufferMode::MovingAverage),
            reading_interval_ms: config.reading_interval_ms,
            retry_ms: config.reading_retry_ms,
        }
    }

    async fn read_with_retry<D: DelayNs, W: Watchdog>(
        &mut self,
        delay: &mut D,
        watchdog: &mut W,
        retry_ms: u32,
    ) -> u16 {
        loop {
            match self.sensor.read().await {
                Ok(cm) => return cm,
                Err(e) => {
                    warn!("Distance read failed: {}, retrying in {} ms", e, retry_ms);
                    watchdog.feed();
                    delay.delay_ms(retry_ms).await;
                }
            }
        }
    }

    /// Fill the whole window with fresh readings.
    pub async fn prefill<D: DelayNs, W: Watchdog>(&mut self, delay: &mut D, watchdog: &mut W) {
        info!("Filling distance filter with {} readings", self.window.capacity());
        self.window.clear();
        while !self.window.is_full() {
            let cm = self.read_with_retry(delay, watchdog, self.retry_ms).await;
            // Moving windows always accept
            let _ = self.window.push(cm);
            watchdog.feed();
            delay.delay_ms(self.reading_interval_ms).await;
        }
    }

    /// Push one more reading and return the window average in cm.
    ///
    /// The window is prefilled first if it is not full yet.
    pub async fn read_filtered<D: DelayNs, W: Watchdog>(
        &mut self,
        delay: &mut D,
        watchdog: &mut W,
    ) -> u16 {
        if !self.window.is_full() {
            self.prefill(delay, watchdog).await;
        }
        let cm = self
            .read_with_retry(delay, watchdog, self.reading_interval_ms)
            .await;
        let _ = self.window.push(cm);
        let average = self.window.mean().unwrap_or(cm);
        debug!("Distance {} cm, filtered {} cm", cm, average);
        average
    }

    pub fn window(&self) -> &SampleRingBuffer<u16> {
        &self.window
    }
}

/// How the firmware should go back to sleep after a wake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepPlan {
    pub sleep_secs: u32,
    /// Arm the tamper line as a wake source, waking on a high level
    pub wake_on_tamper_high: bool,
}

pub struct WakeCycle<'a, U, S, T, D, W> {
    uplink: U,
    filter: DistanceFilter<S>,
    tamper: T,
    delay: D,
    watchdog: W,
    config: DeviceConfig<'a>,
}

impl<'a, U, S, T, D, W> WakeCycle<'a, U, S, T, D, W>
where
    U: Uplink,
    S: Sensor<Reading = u16>,
    T: InputPin,
    T::Error: Debug,
    D: DelayNs,
    W: Watchdog,
{
    pub fn new(
        uplink: U,
        sensor: S,
        tamper: T,
        delay: D,
        watchdog: W,
        config: DeviceConfig<'a>,
    ) -> Self {
        Self {
            filter: DistanceFilter::new(sensor, &config.wake),
            uplink,
            tamper,
            delay,
            watchdog,
            config,
        }
    }

    fn tamper_is_low(&mut self) -> bool {
        match self.tamper.is_low() {
            Ok(low) => low,
            Err(e) => {
                warn!("Could not read tamper line: {:?}", e);
                false
            }
        }
    }

    /// Block until the tamper line has been low for one debounce window.
    async fn wait_for_release(&mut self) {
        let wake = self.config.wake;
        self.delay.delay_ms(wake.release_settle_ms).await;
        loop {
            info!("Waiting for tamper release...");
            self.watchdog.feed();
            if self.tamper_is_low() {
                self.delay.delay_ms(wake.release_debounce_ms).await;
                if self.tamper_is_low() {
                    break;
                }
            }
            self.delay.delay_ms(wake.release_poll_ms).await;
        }
        info!("Tamper released");
    }

    pub async fn run(&mut self, reason: WakeReason) -> SleepPlan {
        info!("Wake-up reason: {:?}", reason);
        self.watchdog.feed();

        if reason == WakeReason::Tamper {
            self.wait_for_release().await;
        }
        self.watchdog.feed();

        if let Err(e) = self.uplink.configure(&self.config.lorawan).await {
            error!("Modem configuration failed: {}", e);
        }
        self.watchdog.feed();

        let distance_cm = self
            .filter
            .read_filtered(&mut self.delay, &mut self.watchdog)
            .await;
        self.watchdog.feed();

        let report = WakeReport {
            distance_cm,
            reason,
        };
        info!("Reporting {} cm, payload {}", distance_cm, report.to_hex());
        if let Err(e) = self
            .uplink
            .send_payload(self.config.lorawan.port, &report.to_bytes())
            .await
        {
            error!("Uplink failed: {}", e);
        }
        self.watchdog.feed();

        let plan = SleepPlan {
            sleep_secs: self.config.wake.sleep_secs,
            wake_on_tamper_high: true,
        };
        info!("Sleeping for {} s", plan.sleep_secs);
        plan
    }

    pub fn filter(&self) -> &DistanceFilter<S> {
        &self.filter
    }
}
