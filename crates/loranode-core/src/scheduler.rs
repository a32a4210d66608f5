//! Transmission scheduler
//!
//! Pure timing decisions, evaluated once per tick against a monotonic
//! millisecond clock. The scheduler never touches sensors or the modem; the
//! pipelines ask it what is due and report back what they did.
//!
//! Burn-in is a one-way gate: until the deadline passes nothing is sampled or
//! sent, and when it passes both timers restart from that instant.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::time::elapsed_ms;

/// Condition on the buffer for a transmission to go out.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitGate {
    /// Only once the sample buffer holds a full window
    WhenBufferFull,
    /// Whenever the transmit interval has elapsed
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    BurnIn,
    Sampling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionTimers {
    pub last_sample_ms: i64,
    pub last_transmit_ms: i64,
    pub burn_in_deadline_ms: Option<i64>,
}

pub struct TransmissionScheduler {
    config: ScheduleConfig,
    state: SchedulerState,
    timers: TransmissionTimers,
    since_checkpoint: u32,
}

impl TransmissionScheduler {
    pub fn new(config: ScheduleConfig, now_ms: i64) -> Self {
        let burn_in_deadline_ms = config.burn_in_ms.map(|d| now_ms + i64::from(d));
        let state = if burn_in_deadline_ms.is_some() {
            info!("Burn-in for {} ms", config.burn_in_ms.unwrap_or(0));
            SchedulerState::BurnIn
        } else {
            SchedulerState::Sampling
        };
        Self {
            config,
            state,
            timers: TransmissionTimers {
                last_sample_ms: now_ms,
                last_transmit_ms: now_ms,
                burn_in_deadline_ms,
            },
            since_checkpoint: 0,
        }
    }

    /// Leave burn-in once its deadline has passed. Returns `true` on the
    /// single tick where the transition happens.
    pub fn advance(&mut self, now_ms: i64) -> bool {
        if self.state != SchedulerState::BurnIn {
            return false;
        }
        match self.timers.burn_in_deadline_ms {
            Some(deadline) if now_ms < deadline => false,
            _ => {
                self.state = SchedulerState::Sampling;
                self.timers.last_sample_ms = now_ms;
                self.timers.last_transmit_ms = now_ms;
                info!("Burn-in finished, sampling enabled");
                true
            }
        }
    }

    pub fn sample_due(&self, now_ms: i64) -> bool {
        if self.state != SchedulerState::Sampling {
            return false;
        }
        match self.config.sample_interval_ms {
            Some(interval) => elapsed_ms(now_ms, self.timers.last_sample_ms) >= i64::from(interval),
            None => false,
        }
    }

    pub fn record_sample(&mut self, now_ms: i64) {
        self.timers.last_sample_ms = now_ms;
    }

    pub fn transmit_due(&self, now_ms: i64, buffer_full: bool) -> bool {
        if self.state != SchedulerState::Sampling {
            return false;
        }
        let elapsed = elapsed_ms(now_ms, self.timers.last_transmit_ms);
        if elapsed < i64::from(self.config.transmit_interval_ms) {
            return false;
        }
        match self.config.gate {
            TransmitGate::Always => true,
            TransmitGate::WhenBufferFull => buffer_full,
        }
    }

    /// Restart the transmit timer after a send attempt. Returns `true` when
    /// this was the K-th attempt since the last checkpoint and the counters
    /// should be persisted now.
    ///
    /// The outcome of the send is not taken into account.
    pub fn record_transmission(&mut self, now_ms: i64) -> bool {
        self.timers.last_transmit_ms = now_ms;
        self.since_checkpoint += 1;
        let every = self.config.checkpoint_every.max(1);
        debug!(
            "Transmission {}/{} before next checkpoint",
            self.since_checkpoint, every
        );
        if self.since_checkpoint >= every {
            self.since_checkpoint = 0;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn timers(&self) -> TransmissionTimers {
        self.timers
    }

    pub fn config(&self) -> &ScheduleConfig {
        &self.config
    }

    /// Transmissions left before the next checkpoint.
    pub fn transmissions_until_checkpoint(&self) -> u32 {
        self.config.checkpoint_every.max(1) - self.since_checkpoint
    }
}
