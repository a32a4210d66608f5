//! Counter table on raw flash
//!
//! The store owns a region of `slots × SLOT_SIZE` bytes. Each slot holds one
//! postcard-encoded [`SlotRecord`]. Slots are filled front to back, so the
//! first erased slot (leading `0xFF`) ends the table. Erasing a namespace
//! compacts the records of other namespaces to the front to keep it that
//! way. Updating a key rewrites its slot in place; the [`Storage`]
//! implementation takes care of the erase cycle.

use alloc::vec::Vec;
use core::fmt::Debug;

use embedded_storage::Storage;
use log::{error, warn};
use serde::{Deserialize, Serialize};

use super::{CounterStore, MAX_KEY_LEN, StoreError};

/// Bytes reserved per record.
///
/// Fits the largest record: two length-prefixed 15 byte strings and a u32
/// varint (37 bytes).
pub const SLOT_SIZE: usize = 48;

const ERASED: u8 = 0xFF;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
struct SlotRecord<'a> {
    namespace: &'a str,
    key: &'a str,
    value: u32,
}

enum Lookup {
    Found(u32),
    Free(u32),
    Full,
}

pub struct FlashCounterStore<F> {
    flash: F,
    base: u32,
    slots: u32,
    namespace: &'static str,
}

impl<F> FlashCounterStore<F>
where
    F: Storage,
    F::Error: Debug,
{
    pub fn new(flash: F, base: u32, slots: u32, namespace: &'static str) -> Result<Self, StoreError> {
        if namespace.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong);
        }
        Ok(Self {
            flash,
            base,
            slots,
            namespace,
        })
    }

    fn slot_offset(&self, slot: u32) -> u32 {
        self.base + slot * SLOT_SIZE as u32
    }

    fn read_slot(&mut self, slot: u32) -> Result<[u8; SLOT_SIZE], StoreError> {
        let mut buf = [0u8; SLOT_SIZE];
        let offset = self.slot_offset(slot);
        self.flash.read(offset, &mut buf).map_err(|e| {
            error!("Flash read at {:#x} failed: {:?}", offset, e);
            StoreError::Flash
        })?;
        Ok(buf)
    }

    fn write_slot(&mut self, slot: u32, buf: &[u8; SLOT_SIZE]) -> Result<(), StoreError> {
        let offset = self.slot_offset(slot);
        self.flash.write(offset, buf).map_err(|e| {
            error!("Flash write at {:#x} failed: {:?}", offset, e);
            StoreError::Flash
        })
    }

    fn lookup(&mut self, key: &str) -> Result<(Lookup, Option<u32>), StoreError> {
        for slot in 0..self.slots {
            let buf = self.read_slot(slot)?;
            if buf[0] == ERASED {
                return Ok((Lookup::Free(slot), None));
            }
            match postcard::from_bytes::<SlotRecord>(&buf) {
                Ok(record) if record.namespace == self.namespace && record.key == key => {
                    return Ok((Lookup::Found(slot), Some(record.value)));
                }
                Ok(_) => {}
                Err(_) => warn!("Skipping unreadable counter slot {}", slot),
            }
        }
        Ok((Lookup::Full, None))
    }

    pub fn release(self) -> F {
        self.flash
    }
}

impl<F> CounterStore for FlashCounterStore<F>
where
    F: Storage,
    F::Error: Debug,
{
    fn read_u32(&mut self, key: &str) -> Result<u32, StoreError> {
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong);
        }
        match self.lookup(key)? {
            (Lookup::Found(_), Some(value)) => Ok(value),
            _ => Err(StoreError::NotFound),
        }
    }

    fn write_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        if key.len() > MAX_KEY_LEN {
            return Err(StoreError::KeyTooLong);
        }
        let slot = match self.lookup(key)? {
            (Lookup::Found(slot), _) | (Lookup::Free(slot), _) => slot,
            (Lookup::Full, _) => return Err(StoreError::Full),
        };

        let record = SlotRecord {
            namespace: self.namespace,
            key,
            value,
        };
        let mut buf = [ERASED; SLOT_SIZE];
        postcard::to_slice(&record, &mut buf).map_err(|_| StoreError::Encoding)?;
        self.write_slot(slot, &buf)
    }

    /// Remove this namespace's records; other namespaces sharing the region
    /// keep theirs and move up to close the gaps.
    fn erase_all(&mut self) -> Result<(), StoreError> {
        let mut kept = Vec::new();
        let mut used = 0;
        for slot in 0..self.slots {
            let buf = self.read_slot(slot)?;
            if buf[0] == ERASED {
                break;
            }
            used = slot + 1;
            // Unreadable slots are kept as they are
            let ours = matches!(
                postcard::from_bytes::<SlotRecord>(&buf),
                Ok(record) if record.namespace == self.namespace
            );
            if !ours {
                kept.push(buf);
            }
        }

        let blank = [ERASED; SLOT_SIZE];
        for slot in 0..used {
            let buf = kept.get(slot as usize).unwrap_or(&blank);
            self.write_slot(slot, buf)?;
        }
        Ok(())
    }
}
