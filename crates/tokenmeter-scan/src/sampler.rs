//! Reservoir sampling of file sizes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed-size uniform sample of the file sizes seen so far.
///
/// Sampling is split in two steps so the caller only stats files that the
/// reservoir actually admits: [`admit`](Self::admit) counts the file and
/// decides whether it gets a slot, [`fill`](Self::fill) stores its size.
#[derive(Debug)]
pub struct SizeSampler {
    capacity: usize,
    slots: Vec<Option<u64>>,
    seen: u64,
    filled: u64,
    sum: u128,
    rng: StdRng,
}

impl SizeSampler {
    /// Create a sampler keeping at most `capacity` sizes.
    pub fn new(capacity: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            seen: 0,
            filled: 0,
            sum: 0,
            rng,
        }
    }

    /// Count one more file and pick the slot it should occupy, if any.
    ///
    /// The first `capacity` files always get a slot. After that the n-th
    /// file replaces a random slot with probability `capacity / n`.
    pub fn admit(&mut self) -> Option<usize> {
        self.seen += 1;
        if self.slots.len() < self.capacity {
            self.slots.push(None);
            return Some(self.slots.len() - 1);
        }
        let pick = self.rng.random_range(0..self.seen);
        usize::try_from(pick).ok().filter(|&slot| slot < self.capacity)
    }

    /// Store the size for a slot returned by [`admit`](Self::admit).
    pub fn fill(&mut self, slot: usize, size: u64) {
        let Some(entry) = self.slots.get_mut(slot) else {
            return;
        };
        match entry.replace(size) {
            Some(old) => self.sum -= u128::from(old),
            None => self.filled += 1,
        }
        self.sum += u128::from(size);
    }

    /// Admit and fill in one step.
    pub fn observe(&mut self, size: u64) {
        if let Some(slot) = self.admit() {
            self.fill(slot, size);
        }
    }

    /// Mean of the sampled sizes.
    pub fn mean(&self) -> Option<f64> {
        (self.filled > 0).then(|| self.sum as f64 / self.filled as f64)
    }

    /// Files counted by [`admit`](Self::admit).
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Sizes currently held.
    pub fn len(&self) -> u64 {
        self.filled
    }

    /// Check if no size has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Maximum sample size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Sampler shared by concurrent directory listings.
///
/// The seen-count increment and the replacement decision happen under one
/// lock, so concurrent listings cannot undercount.
#[derive(Debug, Clone)]
pub struct SharedSampler {
    inner: Arc<Mutex<SizeSampler>>,
}

impl SharedSampler {
    /// Wrap a sampler for shared use.
    pub fn new(sampler: SizeSampler) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sampler)),
        }
    }

    /// See [`SizeSampler::admit`].
    pub fn admit(&self) -> Option<usize> {
        self.lock().admit()
    }

    /// See [`SizeSampler::fill`].
    pub fn fill(&self, slot: usize, size: u64) {
        self.lock().fill(slot, size);
    }

    /// Mean of the sampled sizes.
    pub fn mean(&self) -> Option<f64> {
        self.lock().mean()
    }

    /// Sizes currently held.
    pub fn len(&self) -> u64 {
        self.lock().len()
    }

    /// Check if no size has been stored yet.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Files counted so far.
    pub fn seen(&self) -> u64 {
        self.lock().seen()
    }

    fn lock(&self) -> MutexGuard<'_, SizeSampler> {
        // Plain counters only, usable after a poisoning panic.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
