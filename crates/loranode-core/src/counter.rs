//! Debounced edge counting
//!
//! Each physical input line owns a [`DebouncedCounter`]. The GPIO interrupt
//! for that line calls [`EdgeCounterBank::on_edge_event`] with the current
//! timestamp; accepted edges bump the count and publish it to the line's
//! [`HandoffCell`], from which the scheduler task peeks the latest value.

use core::fmt;

use heapless::Vec;
use log::{debug, info};

use crate::InitError;
use crate::handoff::{HandoffCell, HandoffTable};

/// Default minimum spacing between two accepted edges.
pub const DEFAULT_DEBOUNCE_WINDOW_MS: u32 = 200;

/// Identifier of a counted input line (index into the handoff table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub u8);

impl LineId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line{}", self.0)
    }
}

/// Raw counter state for one input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseCounter {
    /// Accepted edges since the last persistence reset
    pub count: u32,
    /// Timestamp of the last accepted edge (or of arming the line)
    pub last_event_timestamp_ms: i64,
}

/// Counter for one line with a debounce window and a handoff cell.
pub struct DebouncedCounter<'a> {
    line: LineId,
    state: PulseCounter,
    window_ms: i64,
    handoff: &'a HandoffCell<u32>,
}

impl<'a> DebouncedCounter<'a> {
    /// Arm a counter starting from `initial_count` (usually restored from
    /// persistent storage). The initial count is published immediately so the
    /// consumer never waits on a line that simply has not pulsed yet.
    pub fn new(
        line: LineId,
        handoff: &'a HandoffCell<u32>,
        initial_count: u32,
        armed_at_ms: i64,
        window_ms: u32,
    ) -> Self {
        handoff.publish(initial_count);
        Self {
            line,
            state: PulseCounter {
                count: initial_count,
                last_event_timestamp_ms: armed_at_ms,
            },
            window_ms: i64::from(window_ms),
            handoff,
        }
    }

    /// Process one edge. Returns whether the edge was counted.
    ///
    /// Edges closer than the debounce window to the last accepted edge are
    /// dropped without touching the published value. The count wraps at
    /// `u32::MAX`.
    #[inline]
    pub fn on_edge_event(&mut self, timestamp_ms: i64) -> bool {
        if timestamp_ms - self.state.last_event_timestamp_ms < self.window_ms {
            return false;
        }
        self.state.count = self.state.count.wrapping_add(1);
        self.handoff.publish(self.state.count);
        self.state.last_event_timestamp_ms = timestamp_ms;
        true
    }

    pub fn line(&self) -> LineId {
        self.line
    }

    pub fn state(&self) -> PulseCounter {
        self.state
    }
}

/// All counted lines of a device, owned by the interrupt context.
pub struct EdgeCounterBank<'a, const N: usize> {
    counters: Vec<DebouncedCounter<'a>, N>,
    window_ms: u32,
}

impl<'a, const N: usize> EdgeCounterBank<'a, N> {
    pub const fn new(window_ms: u32) -> Self {
        Self {
            counters: Vec::new(),
            window_ms,
        }
    }

    /// Register a line, binding it to its handoff cell in `table`.
    ///
    /// Fails when the table has no cell for the line, when the bank is full
    /// or when the line is already registered. All of these are fatal at boot.
    pub fn register<const T: usize>(
        &mut self,
        line: LineId,
        table: &'a HandoffTable<T>,
        initial_count: u32,
        now_ms: i64,
    ) -> Result<(), InitError> {
        if self.counters.iter().any(|c| c.line == line) {
            return Err(InitError::DuplicateLine(line.0));
        }
        let cell = table.cell(line)?;
        let counter = DebouncedCounter::new(line, cell, initial_count, now_ms, self.window_ms);
        self.counters
            .push(counter)
            .map_err(|_| InitError::HandoffUnavailable(line.0))?;
        info!("Counter armed on {} at {} pulses", line, initial_count);
        Ok(())
    }

    /// Interrupt entry point.
    #[inline]
    pub fn on_edge_event(&mut self, line: LineId, timestamp_ms: i64) -> bool {
        match self.counters.iter_mut().find(|c| c.line == line) {
            Some(counter) => counter.on_edge_event(timestamp_ms),
            None => {
                debug!("Edge on unregistered {}", line);
                false
            }
        }
    }

    pub fn state(&self, line: LineId) -> Option<PulseCounter> {
        self.counters
            .iter()
            .find(|c| c.line == line)
            .map(DebouncedCounter::state)
    }
}
