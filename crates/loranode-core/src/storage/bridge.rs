//! Shared access to the counter store
//!
//! The store sits behind one mutex. Acquisition never waits: if someone else
//! holds the lock the operation fails at once. Reads then fall back to zero
//! and writes are logged and dropped, so a contended checkpoint costs at most
//! one checkpoint period of counts.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use log::{error, info};
use thiserror_no_std::Error;

use super::{CounterStore, StoreError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("storage lock is held elsewhere")]
    Busy,
    #[error("storage failed: {0}")]
    Store(#[from] StoreError),
}

pub struct PersistenceBridge<S> {
    store: Mutex<CriticalSectionRawMutex, S>,
}

impl<S: CounterStore> PersistenceBridge<S> {
    pub const fn new(store: S) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Value of `key`, or 0 when it cannot be read for any reason.
    pub fn load(&self, key: &str) -> u32 {
        match self.try_load(key) {
            Ok(value) => {
                info!("Restored counter {} = {}", key, value);
                value
            }
            Err(e) => {
                error!("Reading counter {} failed ({}), defaulting to 0", key, e);
                0
            }
        }
    }

    pub fn try_load(&self, key: &str) -> Result<u32, PersistenceError> {
        let mut store = self.store.try_lock().map_err(|_| PersistenceError::Busy)?;
        Ok(store.read_u32(key)?)
    }

    pub fn store(&self, key: &str, value: u32) -> Result<(), PersistenceError> {
        let result = self
            .store
            .try_lock()
            .map_err(|_| PersistenceError::Busy)
            .and_then(|mut store| store.write_u32(key, value).map_err(PersistenceError::from));
        match result {
            Ok(()) => info!("Saved counter {} = {}", key, value),
            Err(e) => error!("Saving counter {} failed: {}", key, e),
        }
        result
    }

    pub fn erase_all(&self) -> Result<(), PersistenceError> {
        info!("Erasing persisted counters");
        let mut store = self.store.try_lock().map_err(|_| PersistenceError::Busy)?;
        store.erase_all().inspect_err(|e| error!("Erase failed: {}", e))?;
        Ok(())
    }

    pub fn into_inner(self) -> S {
        self.store.into_inner()
    }
}
