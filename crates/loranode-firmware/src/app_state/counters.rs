//! Pulse counter inputs and their edge interrupt
//!
//! The interrupt handler is the only writer of the counters. It owns the
//! debounce state through [`COUNTER_LINES`] and publishes every accepted count
//! to the static handoff table the pulse pipeline reads from.

use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::gpio::{Event, Input, Io};
use esp_hal::handler;
use log::info;
use loranode_core::InitError;
use loranode_core::counter::{EdgeCounterBank, LineId};
use loranode_core::handoff::{HandoffCell, HandoffTable};
use loranode_core::time::Clock;

use crate::platform::EmbassyClock;

/// Number of pulse inputs on the board.
pub const COUNTER_LINES_COUNT: usize = 2;

static COUNTER_HANDOFF: HandoffTable<COUNTER_LINES_COUNT> = HandoffTable::new();

struct CounterLines {
    inputs: [Input<'static>; COUNTER_LINES_COUNT],
    bank: EdgeCounterBank<'static, COUNTER_LINES_COUNT>,
}

static COUNTER_LINES: Mutex<RefCell<Option<CounterLines>>> = Mutex::new(RefCell::new(None));

/// Seed the counters with their restored values and start counting edges.
///
/// Returns the handoff cells the pulse pipeline peeks, in line order.
pub fn install_counters(
    io: &mut Io<'_>,
    mut inputs: [Input<'static>; COUNTER_LINES_COUNT],
    restored: [u32; COUNTER_LINES_COUNT],
    debounce_window_ms: u32,
) -> Result<[&'static HandoffCell<u32>; COUNTER_LINES_COUNT], InitError> {
    let now_ms = EmbassyClock.now_ms();
    let mut bank = EdgeCounterBank::new(debounce_window_ms);
    for (index, initial) in restored.into_iter().enumerate() {
        bank.register(LineId(index as u8), &COUNTER_HANDOFF, initial, now_ms)?;
    }
    let cells = [
        COUNTER_HANDOFF.cell(LineId(0))?,
        COUNTER_HANDOFF.cell(LineId(1))?,
    ];

    io.set_interrupt_handler(counter_edge_handler);
    critical_section::with(|cs| {
        for input in inputs.iter_mut() {
            input.listen(Event::FallingEdge);
        }
        COUNTER_LINES
            .borrow_ref_mut(cs)
            .replace(CounterLines { inputs, bank });
    });

    info!(
        "Counting falling edges, debounce {} ms, restored {:?}",
        debounce_window_ms, restored
    );
    Ok(cells)
}

#[handler]
fn counter_edge_handler() {
    let now_ms = EmbassyClock.now_ms();
    critical_section::with(|cs| {
        let mut lines = COUNTER_LINES.borrow_ref_mut(cs);
        let Some(CounterLines { inputs, bank }) = lines.as_mut() else {
            return;
        };
        for (index, input) in inputs.iter_mut().enumerate() {
            if input.is_interrupt_set() {
                input.clear_interrupt();
                bank.on_edge_event(LineId(index as u8), now_ms);
            }
        }
    });
}
