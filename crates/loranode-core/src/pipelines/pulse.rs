//! Pulse counter variant
//!
//! The counters themselves live in interrupt context (see
//! [`EdgeCounterBank`](crate::counter::EdgeCounterBank)). This task only
//! peeks their handoff cells on the transmit cadence, reports both values and
//! persists them every K-th transmission.

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info};

use super::{TICK_INTERVAL_MS, TickReport};
use crate::config::ScheduleConfig;
use crate::handoff::HandoffCell;
use crate::modem::Uplink;
use crate::payload::encode_pulse_counts;
use crate::scheduler::TransmissionScheduler;
use crate::storage::{CounterStore, KEY_COUNTER_1, KEY_COUNTER_2, PersistenceBridge};
use crate::time::{Clock, Watchdog};

/// Bounded wait for a handoff cell before the watchdog is fed again.
const HANDOFF_READ_TIMEOUT_MS: u32 = 100;
/// Pause between two bounded waits.
const HANDOFF_RETRY_MS: u32 = 10;

/// Persisted values of both counters, 0 for any that cannot be read.
pub fn restore_counters<S: CounterStore>(bridge: &PersistenceBridge<S>) -> [u32; 2] {
    [bridge.load(KEY_COUNTER_1), bridge.load(KEY_COUNTER_2)]
}

pub struct PulsePipeline<'a, U, S, D, W> {
    counters: [&'a HandoffCell<u32>; 2],
    bridge: &'a PersistenceBridge<S>,
    uplink: U,
    delay: D,
    watchdog: W,
    scheduler: TransmissionScheduler,
    port: u8,
}

impl<'a, U, S, D, W> PulsePipeline<'a, U, S, D, W>
where
    U: Uplink,
    S: CounterStore,
    D: DelayNs,
    W: Watchdog,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        counters: [&'a HandoffCell<u32>; 2],
        bridge: &'a PersistenceBridge<S>,
        uplink: U,
        delay: D,
        watchdog: W,
        schedule: ScheduleConfig,
        port: u8,
        now_ms: i64,
    ) -> Self {
        Self {
            counters,
            bridge,
            uplink,
            delay,
            watchdog,
            scheduler: TransmissionScheduler::new(schedule, now_ms),
            port,
        }
    }

    /// Latest published value of counter `index`.
    ///
    /// Keeps polling until the cell has a value; only the watchdog bounds
    /// this wait.
    async fn read_counter(&mut self, index: usize) -> u32 {
        let cell = self.counters[index];
        loop {
            if let Some(value) = cell
                .read_latest(&mut self.delay, HANDOFF_READ_TIMEOUT_MS)
                .await
            {
                return value;
            }
            self.watchdog.feed();
            self.delay.delay_ms(HANDOFF_RETRY_MS).await;
        }
    }

    pub async fn tick(&mut self, now_ms: i64) -> TickReport {
        let mut report = TickReport::default();
        if !self.scheduler.transmit_due(now_ms, false) {
            return report;
        }

        let counter_1 = self.read_counter(0).await;
        let counter_2 = self.read_counter(1).await;
        let payload = encode_pulse_counts(counter_1, counter_2);
        info!(
            "Sending counters c1={} c2={} payload {:02X?}",
            counter_1, counter_2, payload
        );

        if let Err(e) = self.uplink.send_payload(self.port, &payload).await {
            error!("Uplink failed: {}", e);
        }
        report.transmitted = true;

        if self.scheduler.record_transmission(now_ms) {
            info!("Checkpointing counters");
            // Failures are logged by the bridge; the next checkpoint retries
            let _ = self.bridge.store(KEY_COUNTER_1, counter_1);
            let _ = self.bridge.store(KEY_COUNTER_2, counter_2);
            report.checkpointed = true;
        } else {
            debug!(
                "{} transmissions until next checkpoint",
                self.scheduler.transmissions_until_checkpoint()
            );
        }
        report
    }

    pub async fn run<C: Clock>(&mut self, clock: C) -> ! {
        info!("Pulse counter pipeline running");
        loop {
            self.watchdog.feed();
            self.tick(clock.now_ms()).await;
            self.delay.delay_ms(TICK_INTERVAL_MS).await;
        }
    }

    pub fn scheduler(&self) -> &TransmissionScheduler {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::counter::{EdgeCounterBank, LineId};
    use crate::handoff::HandoffTable;
    use crate::storage::FlashCounterStore;
    use crate::testing::{CountingWatchdog, RamFlash, RecordingUplink, VirtualDelay, VirtualTime};
    use embassy_futures::block_on;

    type Bridge = PersistenceBridge<FlashCounterStore<RamFlash>>;

    fn bridge() -> Bridge {
        PersistenceBridge::new(FlashCounterStore::new(RamFlash::new(512), 0, 8, "cont").unwrap())
    }

    fn schedule() -> ScheduleConfig {
        ScheduleConfig {
            checkpoint_every: 3,
            ..DeviceConfig::pulse_counter(crate::testing::credentials()).schedule
        }
    }

    fn pipeline<'a>(
        table: &'a HandoffTable<2>,
        bridge: &'a Bridge,
        uplink: &RecordingUplink,
        time: &VirtualTime,
    ) -> PulsePipeline<'a, RecordingUplink, FlashCounterStore<RamFlash>, VirtualDelay, CountingWatchdog>
    {
        PulsePipeline::new(
            [
                table.cell(LineId(0)).unwrap(),
                table.cell(LineId(1)).unwrap(),
            ],
            bridge,
            uplink.clone(),
            time.delay(),
            CountingWatchdog::default(),
            schedule(),
            12,
            0,
        )
    }

    #[test]
    fn test_sends_every_interval() {
        let table = HandoffTable::new();
        let bridge = bridge();
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut bank: EdgeCounterBank<'_, 2> = EdgeCounterBank::new(200);
        bank.register(LineId(0), &table, 0, 0).unwrap();
        bank.register(LineId(1), &table, 0, 0).unwrap();
        let mut pipeline = pipeline(&table, &bridge, &uplink, &time);

        bank.on_edge_event(LineId(0), 1_000);
        bank.on_edge_event(LineId(1), 1_000);
        bank.on_edge_event(LineId(1), 2_000);

        assert!(block_on(pipeline.tick(14_999)).is_idle());
        let report = block_on(pipeline.tick(15_000));
        assert!(report.transmitted);
        assert!(!report.checkpointed);

        assert_eq!(uplink.sent(), [(12, alloc::vec![1, 0, 0, 0, 2, 0, 0, 0])]);
    }

    #[test]
    fn test_checkpoint_on_every_kth_transmission() {
        let table = HandoffTable::new();
        let bridge = bridge();
        let uplink = RecordingUplink::new();
        let time = VirtualTime::new();
        let mut bank: EdgeCounterBank<'_, 2> = EdgeCounterBank::new(200);
        bank.register(LineId(0), &table, 0, 0).unwrap();
        bank.register(LineId(1), &table, 100, 0).unwrap();
        let mut pipeline = pipeline(&table, &bridge, &uplink, &time);

        let mut edge_ts = 0;
        for round in 1..=4i64 {
            edge_ts += 1_000;
            bank.on_edge_event(LineId(0), edge_ts);
            let report = block_on(pipeline.tick(round * 15_000));
            assert!(report.transmitted);
            assert_eq!(report.checkpointed, round == 3);
            if round < 3 {
                assert_eq!(bridge.load(KEY_COUNTER_1), 0);
            }
        }

        // Value at the third transmission, not the fourth
        assert_eq!(bridge.load(KEY_COUNTER_1), 3);
        assert_eq!(bridge.load(KEY_COUNTER_2), 100);
    }

    #[test]
    fn test_failed_send_still_counts_towards_checkpoint() {
        let table = HandoffTable::new();
        let bridge = bridge();
        let uplink = RecordingUplink::new();
        uplink.fail_sends();
        let time = VirtualTime::new();
        table.cell(LineId(0)).unwrap().publish(5);
        table.cell(LineId(1)).unwrap().publish(6);
        let mut pipeline = pipeline(&table, &bridge, &uplink, &time);

        for round in 1..=3 {
            block_on(pipeline.tick(round * 15_000));
        }

        assert_eq!(uplink.sent().len(), 3);
        assert_eq!(bridge.load(KEY_COUNTER_1), 5);
    }

    #[test]
    fn test_restore_counters() {
        let bridge = bridge();
        assert_eq!(restore_counters(&bridge), [0, 0]);
        bridge.store(KEY_COUNTER_1, 11).unwrap();
        bridge.store(KEY_COUNTER_2, 22).unwrap();
        assert_eq!(restore_counters(&bridge), [11, 22]);
    }
}
