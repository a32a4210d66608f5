//! Durable counter storage
//!
//! Counters are named 32-bit values in a namespace. They are written only at
//! checkpoints chosen by the scheduler, never on every edge, to bound flash
//! wear.

pub mod bridge;
pub mod flash;

pub use bridge::{PersistenceBridge, PersistenceError};
pub use flash::{FlashCounterStore, SLOT_SIZE};

use thiserror_no_std::Error;

/// Namespace holding the pulse counters.
pub const COUNTER_NAMESPACE: &str = "cont";
/// Key of the first pulse counter.
pub const KEY_COUNTER_1: &str = "c1";
/// Key of the second pulse counter.
pub const KEY_COUNTER_2: &str = "c2";

/// Longest accepted key or namespace.
pub const MAX_KEY_LEN: usize = 15;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("flash access failed")]
    Flash,
    #[error("no free record slot")]
    Full,
    #[error("record could not be encoded or decoded")]
    Encoding,
    #[error("key not found")]
    NotFound,
    #[error("key or namespace longer than 15 characters")]
    KeyTooLong,
}

/// Key/value store of named `u32` counters.
pub trait CounterStore {
    fn read_u32(&mut self, key: &str) -> Result<u32, StoreError>;
    fn write_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError>;
    /// Remove every key of the store.
    fn erase_all(&mut self) -> Result<(), StoreError>;
}
