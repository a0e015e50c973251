//! Errors in the library.
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by storage operations.
///
/// All fatal conditions abort only the operation that triggered them and
/// leave the storage's prior state intact. Warnings (oversized items,
/// under-filled slot replacements, near-capacity forecasts) are logged and
/// never surface as errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Indexed access or assignment outside `[0, len)`.
    #[error("storage index {index} out of range (len {len})")]
    OutOfRange {
        /// The offending logical index.
        index: usize,
        /// Number of items currently in the storage.
        len: usize,
    },

    /// `set` was called before any eviction occurred.
    #[error("assigning items to an index is only allowed after eviction has started; use add() instead")]
    EvictionNotStarted,

    /// A slice specification with step 0.
    #[error("slice step must be nonzero")]
    ZeroStep,

    /// The projected resource footprint exceeds what is currently available.
    #[error("{0}")]
    CapacityExhausted(String),

    /// A slot was read or deleted while holding no item.
    #[error("storage slot {0} is empty")]
    EmptySlot(usize),

    /// No backing-store file was created for the on-disk storage.
    #[error("no backing store file was created at {0:?} for the on-disk storage")]
    MissingBackingFile(PathBuf),

    /// A snapshot was written with an incompatible serialization format.
    #[error("snapshot format version {found} is not supported (expected {expected})")]
    SnapshotVersion {
        /// Version recorded in the snapshot.
        found: u32,
        /// Version supported by this build.
        expected: u32,
    },

    /// The disk backend has been closed and can no longer serve I/O.
    #[error("the storage backend has been closed")]
    BackendClosed,

    /// A capacity bound of zero (or a missing item-count bound) was configured.
    #[error("storage capacities must be finite and greater than zero")]
    InvalidCapacity,
}
