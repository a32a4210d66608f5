//! Temperature logger variant
//!
//! After burn-in, one reading is taken per sample interval into a fixed
//! window. Once the window is full and the transmit interval has elapsed the
//! window is summarised, sent and cleared.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use super::{TICK_INTERVAL_MS, TickReport};
use crate::config::ScheduleConfig;
use crate::modem::Uplink;
use crate::payload::TemperatureSummary;
use crate::samples::{BufferMode, SampleRingBuffer};
use crate::scheduler::TransmissionScheduler;
use crate::sensors::{Sensor, TemperatureReading};
use crate::time::{Clock, Watchdog};

pub struct TemperaturePipeline<U, S, D, W> {
    sensor: S,
    uplink: U,
    delay: D,
    watchdog: W,
    scheduler: TransmissionScheduler,
    buffer: SampleRingBuffer<i8>,
    port: u8,
}

impl<U, S, D, W> TemperaturePipeline<U, S, D, W>
where
    U: Uplink,
    S: Sensor<Reading = TemperatureReading>,
    D: DelayNs,
    W: Watchdog,
{
    pub fn new(
        sensor: S,
        uplink: U,
        delay: D,
        watchdog: W,
        schedule: ScheduleConfig,
        port: u8,
        now_ms: i64,
    ) -> Self {
        let buffer = SampleRingBuffer::new(schedule.buffer_capacity(), BufferMode::FixedWindow);
        info!("Collecting {} samples per window", buffer.capacity());
        Self {
            sensor,
            uplink,
            delay,
            watchdog,
            scheduler: TransmissionScheduler::new(schedule, now_ms),
            buffer,
            port,
        }
    }

    /// Read the sensor until it succeeds, feeding the watchdog between
    /// attempts.
    async fn read_temperature(&mut self) -> TemperatureReading {
        let retry_ms = self.scheduler.config().sensor_retry_ms;
        loop {
            match self.sensor.read().await {
                Ok(reading) => return reading,
                Err(e) => {
                    warn!("Temperature read failed: {}, retrying in {} ms", e, retry_ms);
                    self.watchdog.feed();
                    self.delay.delay_ms(retry_ms).await;
                }
            }
        }
    }

    pub async fn tick(&mut self, now_ms: i64) -> TickReport {
        let mut report = TickReport {
            burn_in_completed: self.scheduler.advance(now_ms),
            ..TickReport::default()
        };

        if self.scheduler.sample_due(now_ms) {
            if self.buffer.is_full() {
                debug!("Window full, skipping sample");
            } else {
                let reading = self.read_temperature().await;
                let sample = reading.truncated_celsius();
                debug!("Sample {} °C ({}/{})", sample, self.buffer.len() + 1, self.buffer.capacity());
                // Cannot fail, fullness was checked above
                let _ = self.buffer.push(sample);
                report.sampled = true;
            }
            self.scheduler.record_sample(now_ms);
        }

        if self.scheduler.transmit_due(now_ms, self.buffer.is_full()) {
            if let Some(summary) = TemperatureSummary::from_buffer(&self.buffer) {
                info!(
                    "Sending summary mean={} max={} min={} stddev_x10={}",
                    summary.mean, summary.max, summary.min, summary.stddev_x10
                );
                if let Err(e) = self.uplink.send_payload(self.port, &summary.to_bytes()).await {
                    error!("Uplink failed: {}", e);
                }
            }
            self.buffer.clear();
            // This variant persists nothing, so the checkpoint cadence is ignored
            self.scheduler.record_transmission(now_ms);
            report.transmitted = true;
        }
        report
    }

    pub async fn run<C: Clock>(&mut self, clock: C) -> ! {
        info!("Temperature pipeline running");
        loop {
            self.watchdog.feed();
            self.tick(clock.now_ms()).await;
            self.delay.delay_ms(TICK_INTERVAL_MS).await;
        }
    }

    pub fn buffer(&self) -> &SampleRingBuffer<i8> {
        &self.buffer
    }

    pub fn scheduler(&self) -> &TransmissionScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::scheduler::SchedulerState;
    use crate::sensors::SensorError;
    use crate::testing::{
        CountingWatchdog, RecordingUplink, ScriptedSensor, VirtualDelay, VirtualTime, credentials,
    };
    use embassy_futures::block_on;

    type Pipeline =
        TemperaturePipeline<RecordingUplink, ScriptedSensor<TemperatureReading>, VirtualDelay, CountingWatchdog>;

    fn celsius(whole: i16) -> TemperatureReading {
        TemperatureReading {
            sixteenths: whole * 16,
        }
    }

    /// 4 samples per window, 1 s apart, after a 3 s burn-in.
    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            sample_interval_ms: Some(1_000),
            transmit_interval_ms: 4_000,
            burn_in_ms: Some(3_000),
            ..DeviceConfig::temperature(credentials()).schedule
        }
    }

    fn pipeline(
        sensor: &ScriptedSensor<TemperatureReading>,
        uplink: &RecordingUplink,
        time: &VirtualTime,
        watchdog: &CountingWatchdog,
    ) -> Pipeline {
        TemperaturePipeline::new(
            sensor.clone(),
            uplink.clone(),
            time.delay(),
            watchdog.clone(),
            schedule(),
            12,
            0,
        )
    }

    #[test]
    fn test_nothing_happens_during_burn_in() {
        let sensor = ScriptedSensor::new(celsius(20));
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &CountingWatchdog::default());

        for now in (0..3_000).step_by(10) {
            assert!(block_on(pipeline.tick(now)).is_idle());
        }
        assert_eq!(pipeline.scheduler().state(), SchedulerState::BurnIn);
        assert_eq!(sensor.reads(), 0);

        let report = block_on(pipeline.tick(3_000));
        assert!(report.burn_in_completed);
        assert!(!report.sampled);
        assert_eq!(pipeline.scheduler().timers().last_sample_ms, 3_000);
    }

    #[test]
    fn test_full_window_is_summarised_and_cleared() {
        let sensor = ScriptedSensor::new(celsius(0));
        for t in [10, 12, 14, 16] {
            sensor.then(Ok(celsius(t)));
        }
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &CountingWatchdog::default());

        block_on(pipeline.tick(3_000));
        for second in 1..=3 {
            let report = block_on(pipeline.tick(3_000 + second * 1_000));
            assert!(report.sampled);
            assert!(!report.transmitted);
        }

        // Fourth sample fills the window on the same tick the interval expires
        let report = block_on(pipeline.tick(7_000));
        assert!(report.sampled);
        assert!(report.transmitted);
        assert!(pipeline.buffer().is_empty());

        // mean 13, max 16, min 10, population stddev 2.236 -> 22
        assert_eq!(uplink.sent(), [(12, alloc::vec![13, 16, 10, 22])]);
    }

    #[test]
    fn test_no_checkpoint_is_reported() {
        let sensor = ScriptedSensor::new(celsius(21));
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &CountingWatchdog::default());

        let mut transmissions = 0;
        for now in (3_000..=3_000 + 12 * 4_000).step_by(1_000) {
            let report = block_on(pipeline.tick(now));
            assert!(!report.checkpointed);
            if report.transmitted {
                transmissions += 1;
            }
        }
        // Past the tenth transmission, where the pulse variant would persist
        assert_eq!(transmissions, 12);
        assert_eq!(uplink.sent().len(), 12);
    }

    #[test]
    fn test_transmission_waits_for_a_full_window() {
        let sensor = ScriptedSensor::new(celsius(-5));
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &CountingWatchdog::default());

        block_on(pipeline.tick(3_000));
        block_on(pipeline.tick(4_000));
        block_on(pipeline.tick(5_000));

        // Interval elapsed but only three samples in the window
        let report = block_on(pipeline.tick(7_000));
        assert!(report.sampled);
        assert!(!report.transmitted);

        let report = block_on(pipeline.tick(8_000));
        assert!(report.transmitted);
        assert_eq!(uplink.sent(), [(12, alloc::vec![0xFB, 0xFB, 0xFB, 0])]);
    }

    #[test]
    fn test_failed_read_is_retried() {
        let sensor = ScriptedSensor::new(celsius(21));
        sensor
            .then(Err(SensorError::CrcMismatch { sensor: "DS18B20" }))
            .then(Err(SensorError::CrcMismatch { sensor: "DS18B20" }));
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let watchdog = CountingWatchdog::default();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &watchdog);

        block_on(pipeline.tick(3_000));
        let report = block_on(pipeline.tick(4_000));

        assert!(report.sampled);
        assert_eq!(sensor.reads(), 3);
        assert_eq!(watchdog.feeds(), 2);
        assert_eq!(time.now_ms(), 2_000);
        assert_eq!(pipeline.buffer().as_slice(), [21]);
    }

    #[test]
    fn test_send_failure_still_clears_the_window() {
        let sensor = ScriptedSensor::new(celsius(18));
        let uplink = RecordingUplink::new();
        uplink.fail_sends();
        let time = VirtualTime::new();
        let mut pipeline = pipeline(&sensor, &uplink, &time, &CountingWatchdog::default());

        block_on(pipeline.tick(3_000));
        for now in [4_000, 5_000, 6_000, 7_000] {
            block_on(pipeline.tick(now));
        }

        assert_eq!(uplink.sent().len(), 1);
        assert!(pipeline.buffer().is_empty());
        assert_eq!(pipeline.scheduler().timers().last_transmit_ms, 7_000);
    }
}
