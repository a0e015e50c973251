//! Disk-persisted slot backend.
//!
//! Items are kept in an embedded key-value store under a backing directory,
//! allowing replay storages larger than memory. Every write is flushed
//! synchronously, so the store survives a process crash up to the last
//! completed `write_slot`.
use super::base::{CapacityForecast, SlotBackend, Storage, StorageItem};
use super::config::StorageConfig;
use crate::error::StorageError;
use crate::util::log_once;
use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempdir::TempDir;

/// Serialization-format version recorded in disk snapshots.
const FORMAT_VERSION: u32 = 1;

/// Name of the backing store inside the buffer directory.
const DB_NAME: &str = "db";

/// A storage persisting its items on disk.
pub type OnDiskStorage<T> = Storage<T, DiskBackend>;

impl<T: StorageItem> OnDiskStorage<T> {
    /// Creates an empty on-disk storage from the given configuration.
    ///
    /// With `buffer_dir` set, the backing store lives in that directory, is
    /// reused across restarts and is never removed by the storage. Without
    /// it, a private temporary directory is created and removed again on
    /// [`OnDiskStorage::close`] (or on drop, as a best-effort fallback).
    pub fn build(config: &StorageConfig) -> Result<Self> {
        Storage::with_backend(config, DiskBackend::open(config.buffer_dir.clone())?)
    }

    /// Directory containing the backing store.
    pub fn buffer_dir(&self) -> &Path {
        self.backend.buffer_dir()
    }

    /// Whether the storage owns its backing directory and removes it on
    /// close.
    pub fn owns_dir(&self) -> bool {
        self.backend.owns_dir()
    }

    /// Releases the backing store.
    ///
    /// Subsequent reads and writes fail with
    /// [`StorageError::BackendClosed`]; closing twice is a no-op.
    /// Flush/close failures propagate; removal of an owned temporary
    /// directory is logged, never raised. Owners should call this on all
    /// exit paths instead of relying on drop timing.
    ///
    /// [`StorageError::BackendClosed`]: crate::error::StorageError::BackendClosed
    pub fn close(&mut self) -> Result<()> {
        self.backend.close()
    }
}

/// Slot backend over an embedded key-value store.
///
/// Keys are the decimal string form of the physical slot index; values are
/// bincode-encoded items. `delete_slot` never removes the underlying key:
/// the store's delete path does not reclaim space, and unbounded
/// delete/insert churn would grow the backing file indefinitely. Only
/// overwrites are ever issued.
pub struct DiskBackend {
    db: Option<sled::Db>,
    buffer_dir: PathBuf,
    db_path: PathBuf,
    owns_dir: bool,
}

/// Snapshot payload of a [`DiskBackend`].
///
/// The item data itself stays in the backing file; the snapshot records
/// where to find it. Taking a snapshot relinquishes the backend's ownership
/// of a temporary directory so the file survives for a later restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSnapshot {
    /// Path of the backing store.
    pub buffer_file: PathBuf,

    /// Whether the restored backend owns (and should eventually delete)
    /// the directory containing the backing store.
    pub owns_dir: bool,

    /// Serialization-format version of the stored values.
    pub format_version: u32,
}

impl DiskBackend {
    /// Opens a backend under `buffer_dir`, or under a fresh private
    /// temporary directory if `None`.
    ///
    /// # Errors
    ///
    /// [`StorageError::MissingBackingFile`] when no backing-store fragment
    /// exists after creation. Store open failures propagate.
    pub fn open(buffer_dir: Option<PathBuf>) -> Result<Self> {
        let (buffer_dir, owns_dir) = match buffer_dir {
            Some(dir) => {
                if dir.exists() {
                    warn!(
                        "on-disk replay storage is writing to an already created backing directory {:?}",
                        dir
                    );
                }
                fs::create_dir_all(&dir)
                    .with_context(|| format!("creating buffer directory {:?}", dir))?;
                (dir, false)
            }
            None => {
                // Detach immediately; removal is handled explicitly in
                // close() so that snapshots can relinquish ownership.
                let tmp = TempDir::new("replay_storage_")?;
                (tmp.into_path(), true)
            }
        };

        let db_path = buffer_dir.join(DB_NAME);
        let db = sled::open(&db_path)
            .with_context(|| format!("opening backing store at {:?}", db_path))?;

        let backend = Self {
            db: Some(db),
            buffer_dir,
            db_path,
            owns_dir,
        };
        backend.check_fragments()?;
        Ok(backend)
    }

    /// Directory containing the backing store.
    pub fn buffer_dir(&self) -> &Path {
        &self.buffer_dir
    }

    /// Whether this backend owns its backing directory and removes it on
    /// close.
    pub fn owns_dir(&self) -> bool {
        self.owns_dir
    }

    /// Verifies that exactly one backing-store fragment exists.
    ///
    /// Zero fragments means the store silently failed to create its file
    /// and is fatal. More than one indicates operator error, e.g. a stale
    /// leftover from an earlier run, and is only warned about.
    fn check_fragments(&self) -> Result<()> {
        let mut fragments = 0usize;
        for entry in fs::read_dir(&self.buffer_dir)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(DB_NAME) {
                fragments += 1;
            }
        }
        if fragments == 0 {
            return Err(StorageError::MissingBackingFile(self.db_path.clone()).into());
        }
        if fragments > 1 {
            warn!(
                "multiple backing store fragments found in {:?}; delete all but {:?} to resolve this warning",
                self.buffer_dir, self.db_path
            );
        }
        Ok(())
    }

    fn db(&self) -> Result<&sled::Db, StorageError> {
        self.db.as_ref().ok_or(StorageError::BackendClosed)
    }

    /// Flushes and releases the store, removing the backing directory if
    /// owned.
    pub(crate) fn close(&mut self) -> Result<()> {
        if let Some(db) = self.db.take() {
            db.flush().context("flushing backing store on close")?;
        }
        if self.owns_dir {
            self.owns_dir = false;
            if let Err(e) = fs::remove_dir_all(&self.buffer_dir) {
                error!(
                    "lacking permission to remove on-disk replay storage files at {:?} ({}); remove them manually",
                    self.buffer_dir, e
                );
            }
        }
        Ok(())
    }
}

impl Drop for DiskBackend {
    fn drop(&mut self) {
        if self.db.is_some() || self.owns_dir {
            if let Err(e) = self.close() {
                error!("failed to close on-disk replay storage: {:#}", e);
            }
        }
    }
}

impl<T: StorageItem> SlotBackend<T> for DiskBackend {
    type Snapshot = DiskSnapshot;

    fn read_slot(&self, idx: usize) -> Result<T> {
        let bytes = self
            .db()?
            .get(idx.to_string())?
            .ok_or(StorageError::EmptySlot(idx))?;
        Ok(bincode::deserialize(&bytes)?)
    }

    fn write_slot(&mut self, idx: usize, item: &T) -> Result<()> {
        let db = self.db()?;
        db.insert(idx.to_string().as_bytes(), bincode::serialize(item)?)?;
        // Every write is a durability point.
        db.flush()?;
        Ok(())
    }

    fn delete_slot(&mut self, idx: usize) -> Result<T> {
        // The key is deliberately left in place; the slot will be
        // overwritten by a later write to the same physical index.
        <Self as SlotBackend<T>>::read_slot(self, idx)
    }

    fn guard_write(&mut self, forecast: &CapacityForecast) -> Result<()> {
        let available = fs2::available_space(&self.buffer_dir)?;
        let pending = forecast.pending_bytes();
        let msg = format!(
            "estimated disk usage for the replay storage is {:.3} GB \
             ({} items of {} timesteps, {} bytes each), of which {:.3} GB are \
             pending for allocation; available disk space is {:.3} GB",
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
            if log_once("replay_storage_disk_capacity") {
                warn!("{}", msg);
            }
        } else if log_once("replay_storage_disk_capacity") {
            info!("{}", msg);
        }
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Self::Snapshot> {
        let snapshot = DiskSnapshot {
            buffer_file: self.db_path.clone(),
            owns_dir: self.owns_dir,
            format_version: FORMAT_VERSION,
        };
        // The backing file must survive for a later restore.
        self.owns_dir = false;
        Ok(snapshot)
    }

    fn restore(&mut self, snapshot: Self::Snapshot) -> Result<()> {
        if snapshot.format_version != FORMAT_VERSION {
            return Err(StorageError::SnapshotVersion {
                found: snapshot.format_version,
                expected: FORMAT_VERSION,
            }
            .into());
        }
        if snapshot.buffer_file != self.db_path {
            // Reopen the snapshot's store in place, then release the old one.
            let new_db = sled::open(&snapshot.buffer_file)
                .with_context(|| format!("reopening backing store at {:?}", snapshot.buffer_file))?;
            let old = self.db.replace(new_db);
            drop(old);
            if self.owns_dir {
                if let Err(e) = fs::remove_dir_all(&self.buffer_dir) {
                    error!(
                        "failed to remove superseded replay storage files at {:?}: {}",
                        self.buffer_dir, e
                    );
                }
            }
            self.buffer_dir = snapshot
                .buffer_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            self.db_path = snapshot.buffer_file;
        } else if let Some(db) = &self.db {
            db.flush()?;
        } else {
            self.db = Some(sled::open(&self.db_path)?);
        }
        self.owns_dir = snapshot.owns_dir;
        Ok(())
    }
}
