//! The abstract ring buffer: index arithmetic, capacity accounting and the
//! eviction loop, shared by every backend.
use super::config::StorageConfig;
use super::view::{SliceSpec, StorageView};
use crate::error::StorageError;
use crate::window_stat::{WindowStat, WindowSummary};
use anyhow::Result;
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;

/// Number of evicted-slot hit counts retained for diagnostics.
const EVICTED_HIT_WINDOW: usize = 1000;

/// Contract for items held by a storage.
///
/// An item is an opaque batch of experience. The storage only depends on the
/// number of timesteps it represents and its serialized byte size; serde
/// bounds exist so that backends can persist items and snapshots can embed
/// them.
pub trait StorageItem: Clone + Serialize + DeserializeOwned {
    /// Number of timesteps represented by this item.
    fn count(&self) -> u64;

    /// Serialized size of this item in bytes.
    fn size_bytes(&self) -> u64;
}

/// Inputs for a backend's resource-usage forecast.
///
/// Ring buffers are sized by the caller ahead of actual usage and can be
/// configured to exceed machine capacity; before every write the backend
/// projects the storage's eventual footprint from the incoming item and
/// compares it against the resource it consumes (physical memory or disk).
#[derive(Debug, Clone, Copy)]
pub struct CapacityForecast {
    /// Maximum number of items the storage may hold.
    pub capacity_items: usize,

    /// Maximum number of timesteps the storage may hold, if bounded.
    pub capacity_timesteps: Option<u64>,

    /// Timesteps in the incoming item.
    pub item_count: u64,

    /// Serialized size of the incoming item in bytes.
    pub item_bytes: u64,

    /// Bytes currently held by the storage.
    pub stored_bytes: u64,
}

impl CapacityForecast {
    /// Projected eventual footprint of the storage in bytes:
    /// `max(capacity_items * item_bytes, capacity_timesteps * per_timestep_bytes)`,
    /// with the second term skipped when the timestep bound is unbounded.
    pub fn projected_bytes(&self) -> u64 {
        let per_item = (self.capacity_items as u64).saturating_mul(self.item_bytes);
        match self.capacity_timesteps {
            Some(cap_ts) => {
                let ts_bytes = self.item_bytes / self.item_count.max(1);
                per_item.max(cap_ts.saturating_mul(ts_bytes))
            }
            None => per_item,
        }
    }

    /// Projected bytes still pending for allocation.
    pub fn pending_bytes(&self) -> u64 {
        self.projected_bytes().saturating_sub(self.stored_bytes)
    }
}

/// Slot primitives implemented by concrete storage backends.
///
/// Slots are physical positions addressed `0..capacity_items`. The ring
/// engine owns all index translation and accounting; backends only move item
/// payloads in and out of slots.
pub trait SlotBackend<T: StorageItem> {
    /// Backend-specific snapshot payload.
    type Snapshot: Serialize + DeserializeOwned;

    /// Returns the item at the given physical slot.
    fn read_slot(&self, idx: usize) -> Result<T>;

    /// Stores an item at the given physical slot, overwriting any previous
    /// occupant.
    fn write_slot(&mut self, idx: usize, item: &T) -> Result<()>;

    /// Removes and returns the item at the given physical slot.
    ///
    /// A backend is permitted to merely "forget" the item without reclaiming
    /// backing storage immediately, as long as the returned value reflects
    /// the slot's occupant for eviction accounting.
    fn delete_slot(&mut self, idx: usize) -> Result<T>;

    /// Checks the projected resource footprint before a write.
    ///
    /// Returns [`StorageError::CapacityExhausted`] when the pending
    /// allocation exceeds the available resource; logs a one-time warning
    /// when it exceeds 20% of it, a one-time note otherwise.
    fn guard_write(&mut self, forecast: &CapacityForecast) -> Result<()>;

    /// Captures the backend-specific part of a storage snapshot.
    fn snapshot(&mut self) -> Result<Self::Snapshot>;

    /// Restores the backend from a snapshot payload.
    fn restore(&mut self, snapshot: Self::Snapshot) -> Result<()>;
}

/// Read access shared by storages and their views.
pub trait StorageRead {
    /// Type of the stored items.
    type Item;

    /// Number of items currently readable.
    fn len(&self) -> usize;

    /// Whether no items are readable.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the item at logical index `i` (0 = oldest).
    ///
    /// Reading does not consume the item, but it does update per-slot hit
    /// counters, hence `&mut self`.
    ///
    /// # Errors
    ///
    /// [`StorageError::OutOfRange`] if `i >= len()`.
    fn get(&mut self, i: usize) -> Result<Self::Item>;

    /// Returns a read-only view over the logical indices selected by `spec`.
    ///
    /// The view materializes its index list at construction; it never
    /// mutates the parent and composes with further slicing.
    fn get_range(&mut self, spec: SliceSpec) -> Result<StorageView<'_, Self>>
    where
        Self: Sized,
    {
        StorageView::new(self, spec)
    }

    /// Iterates over all items in logical order, oldest first.
    ///
    /// The iterator is lazy, finite and restartable; iteration reads through
    /// [`StorageRead::get`] and therefore updates hit counters.
    fn iter(&mut self) -> StorageIter<'_, Self>
    where
        Self: Sized,
    {
        StorageIter { parent: self, i: 0 }
    }
}

/// Iterator over the items of a storage or view in logical order.
pub struct StorageIter<'a, P> {
    parent: &'a mut P,
    i: usize,
}

impl<'a, P: StorageRead> Iterator for StorageIter<'a, P> {
    type Item = Result<P::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.i >= self.parent.len() {
            return None;
        }
        let item = self.parent.get(self.i);
        self.i += 1;
        Some(item)
    }
}

/// Serializable state of a [`Storage`].
///
/// Embeds all capacity fields, the live counters and the backend payload.
/// The per-slot hit-count array is deliberately not part of the snapshot;
/// [`Storage::restore`] always reinitializes it to zeros.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSnapshot<P> {
    /// Maximum number of items.
    pub capacity_items: usize,
    /// Maximum number of timesteps, if bounded.
    pub capacity_timesteps: Option<u64>,
    /// Maximum number of bytes, if bounded.
    pub capacity_bytes: Option<u64>,
    /// Number of items in the storage.
    pub num_items: usize,
    /// Physical index of the logically oldest item.
    pub oldest_slot: usize,
    /// Whether any bound has ever been exceeded.
    pub eviction_started: bool,
    /// Timesteps currently in the storage.
    pub num_timesteps: u64,
    /// Timesteps added over the storage's lifetime.
    pub num_timesteps_added: u64,
    /// Bytes currently in the storage.
    pub size_bytes: u64,
    /// Backend-specific payload.
    pub backend: P,
}

/// A fixed-capacity circular storage over a slot backend.
///
/// Items enter through [`Storage::add`] and are dropped oldest-first once
/// any of the three capacity bounds (items, timesteps, bytes) is exceeded.
/// A single `add` may trigger zero, one, or many evictions, depending on how
/// many old items must go to restore every bound.
#[derive(Debug)]
pub struct Storage<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    pub(crate) capacity_items: usize,
    pub(crate) capacity_timesteps: Option<u64>,
    pub(crate) capacity_bytes: Option<u64>,
    pub(crate) oldest_slot: usize,
    pub(crate) num_items: usize,
    pub(crate) num_timesteps: u64,
    pub(crate) num_timesteps_added: u64,
    pub(crate) size_bytes: u64,
    pub(crate) eviction_started: bool,
    pub(crate) hit_count: Vec<u64>,
    pub(crate) evicted_hit_stats: WindowStat,
    pub(crate) backend: B,
    pub(crate) phantom: PhantomData<fn() -> T>,
}

impl<T, B> Storage<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    /// Creates an empty storage over the given backend.
    pub(crate) fn with_backend(config: &StorageConfig, backend: B) -> Result<Self> {
        if config.capacity_items == 0
            || config.capacity_timesteps == Some(0)
            || config.capacity_bytes == Some(0)
        {
            return Err(StorageError::InvalidCapacity.into());
        }
        Ok(Self {
            capacity_items: config.capacity_items,
            capacity_timesteps: config.capacity_timesteps,
            capacity_bytes: config.capacity_bytes,
            oldest_slot: 0,
            num_items: 0,
            num_timesteps: 0,
            num_timesteps_added: 0,
            size_bytes: 0,
            eviction_started: false,
            hit_count: vec![0; config.capacity_items],
            evicted_hit_stats: WindowStat::new("evicted_hit", EVICTED_HIT_WINDOW),
            backend,
            phantom: PhantomData,
        })
    }

    /// Maximum number of items the storage may contain.
    pub fn capacity_items(&self) -> usize {
        self.capacity_items
    }

    /// Maximum number of timesteps the storage may contain, if bounded.
    pub fn capacity_timesteps(&self) -> Option<u64> {
        self.capacity_timesteps
    }

    /// Maximum number of bytes the storage may contain, if bounded.
    pub fn capacity_bytes(&self) -> Option<u64> {
        self.capacity_bytes
    }

    /// Current size of the stored data in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Number of timesteps currently in the storage.
    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    /// Total number of timesteps added over the storage's lifetime.
    pub fn num_timesteps_added(&self) -> u64 {
        self.num_timesteps_added
    }

    /// Whether eviction of items has started, i.e. the storage has been
    /// "full" at least once. Never resets.
    pub fn eviction_started(&self) -> bool {
        self.eviction_started
    }

    /// Hit statistics of evicted slots (mean, std, quantiles), or `None`
    /// if nothing has been evicted yet.
    pub fn evicted_hit_summary(&self) -> Option<WindowSummary> {
        self.evicted_hit_stats.summary()
    }

    /// Number of times the item at logical index `i` has been read since it
    /// entered its slot.
    pub fn hit_count(&self, i: usize) -> Result<u64> {
        let idx = self.checked_logical(i)?;
        Ok(self.hit_count[idx])
    }

    /// Translates a logical index into the physical slot index of the
    /// circular buffer: `(oldest_slot + i) % capacity_items`.
    pub fn physical_index(&self, i: usize) -> usize {
        (self.oldest_slot + i) % self.capacity_items
    }

    /// Translates a physical slot index back into the logical index space.
    pub fn logical_index(&self, idx: usize) -> usize {
        if idx >= self.oldest_slot {
            idx - self.oldest_slot
        } else {
            idx + self.capacity_items - self.oldest_slot
        }
    }

    /// Adds a new item to the storage.
    ///
    /// The logical index of the new item is assigned automatically. Old
    /// items are dropped oldest-first until every capacity bound holds
    /// again; dropping may require multiple evictions when the new item
    /// contains more timesteps or bytes than the old ones.
    ///
    /// An item that cannot fit even into an empty storage (more timesteps
    /// than `capacity_items` or than a finite timestep bound, or more bytes
    /// than a finite byte bound) is dropped with a warning and the storage
    /// is left untouched.
    ///
    /// # Errors
    ///
    /// [`StorageError::CapacityExhausted`] when the backend's resource
    /// forecast rejects the write; the rejection happens before any
    /// eviction, leaving the storage's prior state intact. Backend I/O
    /// failures propagate.
    pub fn add(&mut self, item: T) -> Result<()> {
        if item.count() > self.capacity_items as u64 {
            warn!(
                "batch of {} timesteps exceeds the storage capacity of {} items and has not been added",
                item.count(),
                self.capacity_items
            );
            return Ok(());
        }
        if self.capacity_timesteps.map_or(false, |c| item.count() > c) {
            warn!(
                "batch of {} timesteps can never satisfy the timestep bound of {:?} and has not been added",
                item.count(),
                self.capacity_timesteps
            );
            return Ok(());
        }
        if self.capacity_bytes.map_or(false, |c| item.size_bytes() > c) {
            warn!(
                "batch of {} bytes can never satisfy the byte bound of {:?} and has not been added",
                item.size_bytes(),
                self.capacity_bytes
            );
            return Ok(());
        }

        // Reject before the first eviction so a failed write leaves the
        // storage untouched.
        let forecast = self.forecast(&item);
        self.backend.guard_write(&forecast)?;

        // May require multiple drops if the newly added item contains more
        // timesteps or bytes than the old ones.
        while self.over_capacity(item.count(), item.size_bytes()) {
            debug_assert!(self.num_items > 0);
            self.evict_oldest()?;
        }

        let idx = self.physical_index(self.num_items);
        self.backend.write_slot(idx, &item)?;
        // Accounting happens only after the backend accepted the write, so
        // an I/O failure leaves the counters matching the stored contents.
        self.num_items += 1;
        self.num_timesteps_added += item.count();
        self.num_timesteps += item.count();
        self.size_bytes += item.size_bytes();
        debug_assert!(self.num_items <= self.capacity_items);
        Ok(())
    }

    /// Replaces the item at logical index `i`.
    ///
    /// The current occupant is evicted with the same accounting as a normal
    /// eviction, but addressed by explicit index instead of always the
    /// oldest. A replacement with fewer timesteps than the evicted item is
    /// tolerated with a warning; the slot stays under-filled until it is
    /// itself evicted.
    ///
    /// # Errors
    ///
    /// [`StorageError::EvictionNotStarted`] before any eviction occurred,
    /// [`StorageError::OutOfRange`] for `i >= len()`, and
    /// [`StorageError::CapacityExhausted`] on guard rejection.
    pub fn set(&mut self, i: usize, item: T) -> Result<()> {
        if !self.eviction_started {
            return Err(StorageError::EvictionNotStarted.into());
        }
        let idx = self.checked_logical(i)?;

        let forecast = self.forecast(&item);
        self.backend.guard_write(&forecast)?;

        let dropped = self.backend.read_slot(idx)?;
        if item.count() < dropped.count() {
            warn!(
                "replacement item holds {} timesteps but the evicted item held {}; the slot stays under-filled",
                item.count(),
                dropped.count()
            );
        }
        self.backend.write_slot(idx, &item)?;
        // The occupant counts as evicted only once the replacement landed;
        // a failed write leaves the slot and all accounting untouched.
        self.evicted_hit_stats.push(self.hit_count[idx] as f64);
        self.hit_count[idx] = 0;
        self.num_timesteps = self.num_timesteps - dropped.count() + item.count();
        self.size_bytes = self.size_bytes - dropped.size_bytes() + item.size_bytes();
        self.num_timesteps_added += item.count();
        Ok(())
    }

    /// Captures the full state of the storage.
    ///
    /// Hit counts are not part of the snapshot and come back as zeros after
    /// a restore.
    pub fn snapshot(&mut self) -> Result<StorageSnapshot<B::Snapshot>> {
        Ok(StorageSnapshot {
            capacity_items: self.capacity_items,
            capacity_timesteps: self.capacity_timesteps,
            capacity_bytes: self.capacity_bytes,
            num_items: self.num_items,
            oldest_slot: self.oldest_slot,
            eviction_started: self.eviction_started,
            num_timesteps: self.num_timesteps,
            num_timesteps_added: self.num_timesteps_added,
            size_bytes: self.size_bytes,
            backend: self.backend.snapshot()?,
        })
    }

    /// Restores the storage to a previously captured state.
    ///
    /// The hit-count array is rebuilt to the restored capacity and reset to
    /// zeros regardless of its value at snapshot time.
    pub fn restore(&mut self, snapshot: StorageSnapshot<B::Snapshot>) -> Result<()> {
        self.backend.restore(snapshot.backend)?;
        self.capacity_items = snapshot.capacity_items;
        self.capacity_timesteps = snapshot.capacity_timesteps;
        self.capacity_bytes = snapshot.capacity_bytes;
        self.num_items = snapshot.num_items;
        self.oldest_slot = snapshot.oldest_slot;
        self.eviction_started = snapshot.eviction_started;
        self.num_timesteps = snapshot.num_timesteps;
        self.num_timesteps_added = snapshot.num_timesteps_added;
        self.size_bytes = snapshot.size_bytes;
        self.hit_count = vec![0; snapshot.capacity_items];
        Ok(())
    }

    fn forecast(&self, item: &T) -> CapacityForecast {
        CapacityForecast {
            capacity_items: self.capacity_items,
            capacity_timesteps: self.capacity_timesteps,
            item_count: item.count(),
            item_bytes: item.size_bytes(),
            stored_bytes: self.size_bytes,
        }
    }

    /// Whether an incoming item of the given weight still requires an
    /// eviction before it can be written.
    fn over_capacity(&self, pending_timesteps: u64, pending_bytes: u64) -> bool {
        self.capacity_timesteps
            .map_or(false, |c| self.num_timesteps + pending_timesteps > c)
            || self
                .capacity_bytes
                .map_or(false, |c| self.size_bytes + pending_bytes > c)
            || self.num_items >= self.capacity_items
    }

    fn evict_oldest(&mut self) -> Result<()> {
        self.eviction_started = true;
        self.evicted_hit_stats
            .push(self.hit_count[self.oldest_slot] as f64);
        self.hit_count[self.oldest_slot] = 0;
        let dropped = self.backend.delete_slot(self.oldest_slot)?;
        self.num_timesteps -= dropped.count();
        self.size_bytes -= dropped.size_bytes();
        self.num_items -= 1;
        self.oldest_slot = (self.oldest_slot + 1) % self.capacity_items;
        Ok(())
    }

    fn checked_logical(&self, i: usize) -> Result<usize, StorageError> {
        if i >= self.num_items {
            return Err(StorageError::OutOfRange {
                index: i,
                len: self.num_items,
            });
        }
        Ok(self.physical_index(i))
    }
}

impl<T, B> StorageRead for Storage<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    type Item = T;

    fn len(&self) -> usize {
        self.num_items
    }

    fn get(&mut self, i: usize) -> Result<T> {
        let idx = self.checked_logical(i)?;
        self.hit_count[idx] += 1;
        self.backend.read_slot(idx)
    }
}
