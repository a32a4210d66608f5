//! Time and liveness collaborators
//!
//! The scheduler and drivers never read a hardware timer directly. They are
//! handed a [`Clock`] for timestamps, an `embedded_hal_async` delay for
//! sleeping and a [`Watchdog`] that has to be fed inside every retry loop.

/// Monotonic clock since boot.
pub trait Clock {
    /// Microseconds since boot.
    fn now_us(&self) -> u64;

    /// Milliseconds since boot.
    fn now_ms(&self) -> i64 {
        (self.now_us() / 1_000) as i64
    }
}

impl<C: Clock> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Hardware or task watchdog.
///
/// Loops that may stall indefinitely (busy modem, failing sensor) feed it on
/// every iteration; the watchdog timeout is the only bound on those loops.
pub trait Watchdog {
    fn feed(&mut self);
}

/// Watchdog for targets where liveness is supervised elsewhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&mut self) {}
}

/// Milliseconds elapsed since `reference_ms`.
#[inline]
pub fn elapsed_ms(now_ms: i64, reference_ms: i64) -> i64 {
    now_ms - reference_ms
}
