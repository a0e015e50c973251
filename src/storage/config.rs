//! Configuration of storages.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Where a storage keeps its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageLocation {
    /// Items live in an in-process slot array.
    InMemory,

    /// Items are persisted in an embedded key-value store on disk.
    OnDisk,
}

/// Configuration of a [`Storage`](super::Storage).
///
/// # Examples
///
/// ```
/// use replay_storage::StorageConfig;
///
/// let config = StorageConfig::default()
///     .capacity_items(1000)
///     .capacity_timesteps(Some(50_000))
///     .capacity_bytes(None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Maximum number of items to store. After reaching this number, older
    /// items are dropped to make space for new ones. Has to be finite in
    /// order to keep track of the per-slot hit count.
    pub capacity_items: usize,

    /// Maximum number of timesteps to store, or `None` for unbounded.
    pub capacity_timesteps: Option<u64>,

    /// Maximum number of bytes to store, or `None` for unbounded.
    pub capacity_bytes: Option<u64>,

    /// Backend selection.
    pub location: StorageLocation,

    /// Backing directory for the on-disk backend. When set, the directory is
    /// reused across restarts and never removed by the storage; when `None`,
    /// a private temporary directory is used and removed on close.
    pub buffer_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity_items: 10000,
            capacity_timesteps: None,
            capacity_bytes: None,
            location: StorageLocation::InMemory,
            buffer_dir: None,
        }
    }
}

impl StorageConfig {
    /// Sets the maximum number of items.
    pub fn capacity_items(mut self, capacity_items: usize) -> Self {
        self.capacity_items = capacity_items;
        self
    }

    /// Sets the maximum number of timesteps.
    pub fn capacity_timesteps(mut self, capacity_timesteps: Option<u64>) -> Self {
        self.capacity_timesteps = capacity_timesteps;
        self
    }

    /// Sets the maximum number of bytes.
    pub fn capacity_bytes(mut self, capacity_bytes: Option<u64>) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// Sets the backend selection.
    pub fn location(mut self, location: StorageLocation) -> Self {
        self.location = location;
        self
    }

    /// Sets the backing directory for the on-disk backend.
    pub fn buffer_dir(mut self, buffer_dir: Option<PathBuf>) -> Self {
        self.buffer_dir = buffer_dir;
        self
    }

    /// Loads the configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let c = serde_yaml::from_reader(rdr)?;
        Ok(c)
    }

    /// Saves the configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn yaml_round_trip() {
        let dir = TempDir::new("replay_storage_config").unwrap();
        let path = dir.path().join("storage.yaml");
        let config = StorageConfig::default()
            .capacity_items(128)
            .capacity_bytes(Some(1 << 20))
            .location(StorageLocation::OnDisk);
        config.save(&path).unwrap();
        assert_eq!(StorageConfig::load(&path).unwrap(), config);
    }
}
