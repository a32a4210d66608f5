//! Device applications
//!
//! Each loranode variant is one pipeline wiring sensors, the scheduler and
//! the uplink together:
//!
//! - [`PulsePipeline`]: two debounced pulse counters, reported on a fixed
//!   cadence and checkpointed to flash
//! - [`TemperaturePipeline`]: burn-in, then windowed temperature statistics
//! - [`WakeCycle`]: one tamper/timer wake-up, a filtered distance reading and
//!   a report, followed by deep sleep
//!
//! The continuous pipelines expose `tick` for deterministic tests and `run`
//! as the device main loop.

pub mod pulse;
pub mod tamper;
pub mod temperature;

pub use pulse::{PulsePipeline, restore_counters};
pub use tamper::{DistanceFilter, SleepPlan, WakeCycle};
pub use temperature::TemperaturePipeline;

/// Delay between two scheduler ticks of a continuous pipeline.
pub const TICK_INTERVAL_MS: u32 = 10;

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub burn_in_completed: bool,
    pub sampled: bool,
    pub transmitted: bool,
    pub checkpointed: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}
