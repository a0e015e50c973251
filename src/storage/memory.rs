//! In-memory slot backend.
use super::base::{CapacityForecast, SlotBackend, Storage, StorageItem};
use super::config::StorageConfig;
use crate::error::StorageError;
use crate::util::log_once;
use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// A storage backed by an in-process slot array.
pub type InMemoryStorage<T> = Storage<T, MemoryBackend<T>>;

impl<T: StorageItem> InMemoryStorage<T> {
    /// Creates an empty in-memory storage from the given configuration.
    ///
    /// The slot array is pre-allocated to `capacity_items`.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidCapacity`] for a zero capacity bound.
    ///
    /// [`StorageError::InvalidCapacity`]: crate::error::StorageError::InvalidCapacity
    pub fn build(config: &StorageConfig) -> Result<Self> {
        Storage::with_backend(config, MemoryBackend::new(config.capacity_items))
    }
}

/// Slot backend holding items in a pre-allocated `Vec<Option<T>>`.
///
/// Deleting a slot clears it back to `None`, allowing the item's memory to
/// be reclaimed immediately.
#[derive(Debug)]
pub struct MemoryBackend<T> {
    slots: Vec<Option<T>>,
    system: System,
}

/// Snapshot payload of a [`MemoryBackend`]: the full slot array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySnapshot<T> {
    /// All physical slots, occupied or not.
    pub slots: Vec<Option<T>>,
}

impl<T> MemoryBackend<T> {
    /// Creates a backend with `capacity_items` empty slots.
    pub fn new(capacity_items: usize) -> Self {
        Self {
            slots: (0..capacity_items).map(|_| None).collect(),
            system: System::new(),
        }
    }

    fn slot_mut(&mut self, idx: usize) -> Result<&mut Option<T>, StorageError> {
        let len = self.slots.len();
        self.slots
            .get_mut(idx)
            .ok_or(StorageError::OutOfRange { index: idx, len })
    }
}

impl<T: StorageItem> SlotBackend<T> for MemoryBackend<T> {
    type Snapshot = MemorySnapshot<T>;

    fn read_slot(&self, idx: usize) -> Result<T> {
        let slot = self.slots.get(idx).ok_or(StorageError::OutOfRange {
            index: idx,
            len: self.slots.len(),
        })?;
        Ok(slot.clone().ok_or(StorageError::EmptySlot(idx))?)
    }

    fn write_slot(&mut self, idx: usize, item: &T) -> Result<()> {
        *self.slot_mut(idx)? = Some(item.clone());
        Ok(())
    }

    fn delete_slot(&mut self, idx: usize) -> Result<T> {
        Ok(self.slot_mut(idx)?.take().ok_or(StorageError::EmptySlot(idx))?)
    }

    fn guard_write(&mut self, forecast: &CapacityForecast) -> Result<()> {
        self.system.refresh_memory();
        let available = self.system.available_memory();
        let pending = forecast.pending_bytes();
        let msg = format!(
            "estimated memory usage for the replay storage is {:.3} GB \
             ({} items of {} timesteps, {} bytes each), of which {:.3} GB are \
             pending for allocation; available memory is {:.3} GB",
            forecast.projected_bytes() as f64 / 1e9,
            forecast.capacity_items,
            forecast.item_count,
            forecast.item_bytes,
            pending as f64 / 1e9,
            available as f64 / 1e9,
        );
        if pending > available {
            return Err(StorageError::CapacityExhausted(msg).into());
        } else if pending > available / 5 {
            if log_once("replay_storage_memory_capacity") {
                warn!("{}", msg);
            }
        } else if log_once("replay_storage_memory_capacity") {
            info!("{}", msg);
        }
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Self::Snapshot> {
        Ok(MemorySnapshot {
            slots: self.slots.clone(),
        })
    }

    fn restore(&mut self, snapshot: Self::Snapshot) -> Result<()> {
        self.slots = snapshot.slots;
        Ok(())
    }
}
