#![warn(missing_docs)]
//! Fixed-capacity circular storage backends for experience replay.
//!
//! This crate implements the retention layer that sits beneath a replay
//! buffer: a ring buffer of variable-sized batches ("items") bounded along
//! three independent axes (item count, timestep count, byte size). Old items
//! are evicted transparently once any bound is exceeded. Items can be read
//! and written by logical index, projected through read-only windowed views,
//! and persisted with snapshot/restore.
//!
//! Two backends are provided:
//! - [`InMemoryStorage`]: items live in a pre-allocated slot array.
//! - [`OnDiskStorage`]: items are persisted in an embedded key-value store,
//!   allowing buffers larger than memory.
//!
//! [`ReservoirBuffer`] wraps either backend and replaces FIFO eviction with
//! reservoir sampling (Vitter's Algorithm R) once the storage is full.
pub mod error;
pub mod storage;
pub mod util;
pub mod window_stat;

mod reservoir;
pub use reservoir::{ReservoirBuffer, ReservoirConfig, ReservoirSnapshot};
pub use storage::{
    CapacityForecast, DiskBackend, DiskSnapshot, InMemoryStorage, MemoryBackend, MemorySnapshot,
    OnDiskStorage, SliceSpec, SlotBackend, Storage, StorageConfig, StorageItem, StorageLocation,
    StorageRead, StorageSnapshot, StorageView,
};
pub use window_stat::{WindowStat, WindowSummary};
