//! Circular storage for replay items.
//!
//! The ring-buffer arithmetic and capacity/eviction logic live in
//! [`Storage`], implemented once over the [`SlotBackend`] trait. Concrete
//! backends supply only the three slot primitives (read, write, delete) plus
//! a resource-usage guard and their snapshot payload.
mod base;
mod config;
mod disk;
mod memory;
mod view;
pub use base::{
    CapacityForecast, SlotBackend, Storage, StorageItem, StorageIter, StorageRead, StorageSnapshot,
};
pub use config::{StorageConfig, StorageLocation};
pub use disk::{DiskBackend, DiskSnapshot, OnDiskStorage};
pub use memory::{InMemoryStorage, MemoryBackend, MemorySnapshot};
pub use view::{SliceSpec, StorageView};
