//! Reservoir-sampling eviction policy.
//!
//! Implements Vitter's Algorithm R ("Random sampling with a reservoir",
//! <https://www.cs.umd.edu/~samir/498/vitter.pdf>): once the underlying
//! storage is full, new items replace random occupants instead of the
//! oldest one, so that every item ever offered has the same probability
//! `capacity_items / num_add_calls` of being present in the retained set.
use crate::storage::{SlotBackend, Storage, StorageItem, StorageRead, StorageSnapshot};
use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

/// Configuration of a [`ReservoirBuffer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirConfig {
    /// Random seed for the replacement draws.
    pub seed: u64,
}

impl Default for ReservoirConfig {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl ReservoirConfig {
    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
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

/// Serializable state of a [`ReservoirBuffer`].
///
/// Embeds the policy counters and the wrapped storage's snapshot. The
/// lifetime offer count must survive persistence: restarting it at zero
/// would make later replacement draws far too likely and skew the retained
/// sample toward recent items. The random generator's state is not
/// captured; a restored buffer continues with its own seed sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservoirSnapshot<P> {
    /// Total number of items ever offered at snapshot time.
    pub num_add_calls: u64,
    /// Number of policy replacements performed at snapshot time.
    pub num_evicted: u64,
    /// State of the wrapped storage.
    pub storage: StorageSnapshot<P>,
}

/// A buffer retaining a statistically unbiased random sample of everything
/// ever offered to it.
///
/// While the underlying storage still has free slots, items are added FIFO.
/// Once the storage has begun evicting, each offered item replaces a
/// uniformly chosen logical slot with probability `len / n` (where `n` is
/// the lifetime offer count) and is discarded otherwise. The storage itself
/// performs no further evictions at that point, since replacement goes
/// through `set`, not `add`.
pub struct ReservoirBuffer<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    storage: Storage<T, B>,
    num_add_calls: u64,
    num_evicted: u64,
    rng: StdRng,
}

impl<T, B> ReservoirBuffer<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    /// Wraps a storage with the reservoir policy.
    pub fn new(storage: Storage<T, B>, config: &ReservoirConfig) -> Self {
        Self {
            storage,
            num_add_calls: 0,
            num_evicted: 0,
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Offers an item to the reservoir.
    ///
    /// The lifetime counter is incremented for every offered item, accepted
    /// or not; the replacement draw uses the incremented value. Drawing `j`
    /// uniformly from `[0, n - 1]` inclusive and replacing only when
    /// `j < len` is what makes the retention probability exactly
    /// `capacity / n`; shifting either bound breaks the guarantee.
    pub fn add(&mut self, item: T) -> Result<()> {
        self.num_add_calls += 1;
        if self.storage.eviction_started() {
            let j = self.rng.gen_range(0..self.num_add_calls);
            if (j as usize) < self.storage.len() {
                self.num_evicted += 1;
                self.storage.set(j as usize, item)?;
            }
        } else {
            self.storage.add(item)?;
        }
        Ok(())
    }

    /// Captures the full state of the policy and its storage.
    pub fn snapshot(&mut self) -> Result<ReservoirSnapshot<B::Snapshot>> {
        Ok(ReservoirSnapshot {
            num_add_calls: self.num_add_calls,
            num_evicted: self.num_evicted,
            storage: self.storage.snapshot()?,
        })
    }

    /// Restores the policy and its storage to a previously captured state.
    pub fn restore(&mut self, snapshot: ReservoirSnapshot<B::Snapshot>) -> Result<()> {
        self.storage.restore(snapshot.storage)?;
        self.num_add_calls = snapshot.num_add_calls;
        self.num_evicted = snapshot.num_evicted;
        Ok(())
    }

    /// Total number of items ever offered.
    pub fn num_add_calls(&self) -> u64 {
        self.num_add_calls
    }

    /// Number of replacements performed by the policy.
    ///
    /// Separate from any evictions the storage performed internally while
    /// filling up.
    pub fn num_evicted(&self) -> u64 {
        self.num_evicted
    }

    /// Read access to the underlying storage.
    pub fn storage(&self) -> &Storage<T, B> {
        &self.storage
    }

    /// Mutable access to the underlying storage.
    pub fn storage_mut(&mut self) -> &mut Storage<T, B> {
        &mut self.storage
    }

    /// Consumes the policy, returning the underlying storage.
    pub fn into_storage(self) -> Storage<T, B> {
        self.storage
    }
}

impl<T, B> StorageRead for ReservoirBuffer<T, B>
where
    T: StorageItem,
    B: SlotBackend<T>,
{
    type Item = T;

    fn len(&self) -> usize {
        self.storage.len()
    }

    fn get(&mut self, i: usize) -> Result<T> {
        self.storage.get(i)
    }
}
