//! Lifecycle and persistence tests for the on-disk storage.
use replay_storage::error::StorageError;
use replay_storage::{OnDiskStorage, SliceSpec, StorageConfig, StorageItem, StorageRead};
use serde::{Deserialize, Serialize};
use tempdir::TempDir;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Batch {
    id: u32,
    steps: u64,
    payload: Vec<u8>,
}

impl StorageItem for Batch {
    fn count(&self) -> u64 {
        self.steps
    }

    fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

fn batch(id: u32) -> Batch {
    Batch {
        id,
        steps: 1,
        payload: vec![id as u8; 64],
    }
}

fn build(capacity_items: usize, buffer_dir: Option<std::path::PathBuf>) -> OnDiskStorage<Batch> {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = StorageConfig::default()
        .capacity_items(capacity_items)
        .buffer_dir(buffer_dir);
    OnDiskStorage::build(&config).unwrap()
}

#[test]
fn add_get_round_trip() {
    let mut s = build(8, None);
    for id in 0..5 {
        s.add(batch(id)).unwrap();
    }
    assert_eq!(s.len(), 5);
    for i in 0..5 {
        assert_eq!(s.get(i).unwrap(), batch(i as u32));
    }
    s.close().unwrap();
}

#[test]
fn fifo_eviction_on_disk() {
    let mut s = build(3, None);
    for id in [1, 2, 3, 4].iter() {
        s.add(batch(*id)).unwrap();
    }
    assert!(s.eviction_started());
    let ids: Vec<u32> = s.iter().map(|b| b.unwrap().id).collect();
    assert_eq!(ids, vec![2, 3, 4]);
    s.close().unwrap();
}

#[test]
fn views_read_through_disk() {
    let mut s = build(10, None);
    for id in 0..10 {
        s.add(batch(id)).unwrap();
    }
    let mut view = s.get_range(SliceSpec::new(Some(2), Some(8), 2)).unwrap();
    let ids: Vec<u32> = view.iter().map(|b| b.unwrap().id).collect();
    assert_eq!(ids, vec![2, 4, 6]);
    s.close().unwrap();
}

#[test]
fn temporary_backing_dir_is_removed_on_close() {
    let mut s = build(4, None);
    assert!(s.owns_dir());
    let dir = s.buffer_dir().to_path_buf();
    assert!(dir.exists());
    s.close().unwrap();
    assert!(!dir.exists());
}

#[test]
fn caller_supplied_dir_survives_close() {
    let tmp = TempDir::new("replay_storage_test").unwrap();
    let dir = tmp.path().join("buffer");
    {
        let mut s = build(4, Some(dir.clone()));
        assert!(!s.owns_dir());
        s.add(batch(7)).unwrap();
        s.close().unwrap();
    }
    assert!(dir.exists());
    assert!(dir.join("db").exists());
}

#[test]
fn reads_fail_after_close() {
    let mut s = build(4, None);
    s.add(batch(1)).unwrap();
    s.close().unwrap();
    let err = s.get(0).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StorageError>(),
        Some(StorageError::BackendClosed)
    ));
    // Closing again changes nothing.
    s.close().unwrap();
}

#[test]
fn snapshot_restore_reopens_backing_file_in_place() {
    let mut s = build(3, None);
    for id in 0..4 {
        s.add(batch(id)).unwrap();
    }
    s.get(0).unwrap();
    let snap = s.snapshot().unwrap();
    // Taking a snapshot relinquishes ownership: the backing file must
    // survive this storage for the restore below.
    assert!(!s.owns_dir());
    let old_dir = s.buffer_dir().to_path_buf();
    drop(s);
    assert!(old_dir.exists());

    let mut restored = build(2, None);
    restored.restore(snap).unwrap();
    assert_eq!(restored.len(), 3);
    assert_eq!(restored.capacity_items(), 3);
    assert!(restored.eviction_started());
    let ids: Vec<u32> = restored.iter().map(|b| b.unwrap().id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    // Hit counts always restart at zero; iter() above accounts for one read.
    assert_eq!(restored.hit_count(0).unwrap(), 1);

    // The restored storage inherited ownership of the temporary directory.
    assert!(restored.owns_dir());
    restored.close().unwrap();
    assert!(!old_dir.exists());
}

#[test]
fn restore_into_caller_supplied_dir_keeps_files() {
    let tmp = TempDir::new("replay_storage_test").unwrap();
    let dir = tmp.path().join("buffer");
    let snap = {
        let mut s = build(4, Some(dir.clone()));
        for id in 0..3 {
            s.add(batch(id)).unwrap();
        }
        let snap = s.snapshot().unwrap();
        s.close().unwrap();
        snap
    };

    let mut restored = build(4, Some(dir.clone()));
    restored.restore(snap).unwrap();
    let ids: Vec<u32> = restored.iter().map(|b| b.unwrap().id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    restored.close().unwrap();
    assert!(dir.exists());
}
