//! Single-slot handoff between interrupt and task context
//!
//! The producer (a GPIO interrupt) overwrites the slot with its latest value
//! and never waits. The consumer peeks the slot; only the most recent value
//! is ever visible and nothing is queued.
//!
//! The slot is guarded by a critical section, so a reader can never observe
//! a torn value even on targets without native atomics of the value's width.

use core::cell::Cell;

use critical_section::Mutex;
use embedded_hal_async::delay::DelayNs;

use crate::InitError;
use crate::counter::LineId;

/// Polling step used while waiting for the first value.
const POLL_INTERVAL_MS: u32 = 1;

/// Latest-value-wins mailbox holding at most one `T`.
pub struct HandoffCell<T> {
    slot: Mutex<Cell<Option<T>>>,
}

impl<T> HandoffCell<T> {
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(Cell::new(None)),
        }
    }
}

impl<T> Default for HandoffCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> HandoffCell<T> {
    /// Overwrite the slot. Safe to call from interrupt context.
    #[inline]
    pub fn publish(&self, value: T) {
        critical_section::with(|cs| self.slot.borrow(cs).set(Some(value)));
    }

    /// Current value without consuming it, `None` until the first publish.
    #[inline]
    pub fn peek(&self) -> Option<T> {
        critical_section::with(|cs| self.slot.borrow(cs).get())
    }

    /// Wait up to `timeout_ms` for a value to be available.
    ///
    /// Returns immediately once a value has been published. Callers that must
    /// have a value retry this in a loop, feeding the watchdog in between.
    pub async fn read_latest<D: DelayNs>(&self, delay: &mut D, timeout_ms: u32) -> Option<T> {
        let mut waited_ms = 0;
        loop {
            if let Some(value) = self.peek() {
                return Some(value);
            }
            if waited_ms >= timeout_ms {
                return None;
            }
            delay.delay_ms(POLL_INTERVAL_MS).await;
            waited_ms += POLL_INTERVAL_MS;
        }
    }
}

/// Fixed table of counter handoff cells, one per physical input line.
///
/// Meant to live in a `static` so both the interrupt handler and the
/// scheduler task can reach it.
pub struct HandoffTable<const N: usize> {
    cells: [HandoffCell<u32>; N],
}

impl<const N: usize> HandoffTable<N> {
    pub const fn new() -> Self {
        Self {
            cells: [const { HandoffCell::new() }; N],
        }
    }

    /// Cell assigned to `line`.
    ///
    /// A line outside the table has no cell; this is a fatal wiring error.
    pub fn cell(&self, line: LineId) -> Result<&HandoffCell<u32>, InitError> {
        self.cells
            .get(line.index())
            .ok_or(InitError::HandoffUnavailable(line.0))
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for HandoffTable<N> {
    fn default() -> Self {
        Self::new()
    }
}
