//! Open-addressed, bucket-group-locked hash table keyed by canonical k-mer.

use std::cell::UnsafeCell;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHasher;

use crate::error::{CortexError, Result};
use crate::kmer::Kmer;

pub type VertexId = usize;

/// Buckets covered by a single bucket-group lock.
const LOCK_GROUP: usize = 64;
/// Default bounded linear-probe window.
const DEFAULT_PROBE_WINDOW: usize = 8;

struct Bucket {
    occupied: AtomicBool,
    kmer: UnsafeCell<Option<Kmer>>,
}

// SAFETY: `kmer` is written exactly once, under the bucket-group lock, before
// `occupied` is set with `Release` ordering. All reads first observe
// `occupied == true` with `Acquire` ordering, which happens-before the write,
// so concurrent reads of the initialized `Option<Kmer>` are race-free.
unsafe impl Sync for Bucket {}

impl Bucket {
    fn empty() -> Self {
        Bucket {
            occupied: AtomicBool::new(false),
            kmer: UnsafeCell::new(None),
        }
    }
}

pub struct BucketedHashTable {
    buckets: Vec<Bucket>,
    locks: Vec<Mutex<()>>,
    capacity: usize,
    probe_window: usize,
}

impl BucketedHashTable {
    pub fn new(capacity: usize) -> Self {
        Self::with_probe_window(capacity, DEFAULT_PROBE_WINDOW)
    }

    pub fn with_probe_window(capacity: usize, probe_window: usize) -> Self {
        assert!(capacity > 0, "hash table capacity must be nonzero");
        let mut buckets = Vec::with_capacity(capacity);
        buckets.resize_with(capacity, Bucket::empty);
        let n_lock_groups = capacity.div_ceil(LOCK_GROUP).max(1);
        let mut locks = Vec::with_capacity(n_lock_groups);
        locks.resize_with(n_lock_groups, || Mutex::new(()));
        Self {
            buckets,
            locks,
            capacity,
            probe_window,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len_occupied(&self) -> usize {
        self.buckets
            .iter()
            .filter(|b| b.occupied.load(Ordering::Acquire))
            .count()
    }

    fn hash(&self, kmer: &Kmer) -> usize {
        let mut hasher = FxHasher::default();
        kmer.limbs().hash(&mut hasher);
        (hasher.finish() as usize) % self.capacity
    }

    fn lock_for(&self, bucket_idx: usize) -> &Mutex<()> {
        &self.locks[bucket_idx / LOCK_GROUP]
    }

    /// Lock-free read: relies on single-writer-per-bucket plus the
    /// release/acquire pair on `occupied`.
    pub fn find(&self, kmer: &Kmer) -> Option<VertexId> {
        let start = self.hash(kmer);
        for offset in 0..self.probe_window {
            let idx = (start + offset) % self.capacity;
            let bucket = &self.buckets[idx];
            if !bucket.occupied.load(Ordering::Acquire) {
                return None;
            }
            let stored = unsafe { &*bucket.kmer.get() };
            if stored.as_ref() == Some(kmer) {
                return Some(idx);
            }
        }
        None
    }

    /// Find the vertex for `kmer`'s canonical form, inserting it if absent.
    /// Returns `(vertex_id, was_new)`.
    pub fn find_or_insert(&self, kmer: Kmer) -> Result<(VertexId, bool)> {
        let start = self.hash(&kmer);
        for offset in 0..self.probe_window {
            let idx = (start + offset) % self.capacity;
            let bucket = &self.buckets[idx];

            if bucket.occupied.load(Ordering::Acquire) {
                let stored = unsafe { &*bucket.kmer.get() };
                if stored.as_ref() == Some(&kmer) {
                    return Ok((idx, false));
                }
                continue;
            }

            let lock = self.lock_for(idx);
            let _guard = lock.lock();

            // Re-check under the lock: another writer may have filled this
            // bucket (with this key or another) between our lock-free peek
            // and acquiring the lock.
            if bucket.occupied.load(Ordering::Acquire) {
                let stored = unsafe { &*bucket.kmer.get() };
                if stored.as_ref() == Some(&kmer) {
                    return Ok((idx, false));
                }
                continue;
            }

            unsafe {
                *bucket.kmer.get() = Some(kmer.clone());
            }
            bucket.occupied.store(true, Ordering::Release);
            return Ok((idx, true));
        }

        Err(CortexError::OutOfMemory(format!(
            "hash table probe window ({}) exhausted starting at bucket {start}",
            self.probe_window
        )))
    }

    pub fn kmer_at(&self, vid: VertexId) -> Option<&Kmer> {
        let bucket = &self.buckets[vid];
        if !bucket.occupied.load(Ordering::Acquire) {
            return None;
        }
        unsafe { (*bucket.kmer.get()).as_ref() }
    }

    /// Debug-only fill-ratio integrity check.
    #[cfg(debug_assertions)]
    pub fn assert_fill_ratio_ok(&self) {
        let occupied = self.len_occupied();
        let ratio = occupied as f64 / self.capacity as f64;
        assert!(
            ratio <= 0.95,
            "hash table fill ratio {ratio:.3} exceeds safe bound; capacity was \
             undersized for this load"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_same_vertex() {
        let table = BucketedHashTable::new(64);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid1, was_new1) = table.find_or_insert(km.clone()).unwrap();
        assert!(was_new1);
        let (vid2, was_new2) = table.find_or_insert(km.clone()).unwrap();
        assert!(!was_new2);
        assert_eq!(vid1, vid2);
        assert_eq!(table.find(&km), Some(vid1));
    }

    #[test]
    fn distinct_kmers_get_distinct_vertices() {
        let table = BucketedHashTable::new(64);
        let a = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let b = Kmer::from_ascii(b"TTTTT", 5).unwrap();
        let (va, _) = table.find_or_insert(a).unwrap();
        let (vb, _) = table.find_or_insert(b).unwrap();
        assert_ne!(va, vb);
    }

    #[test]
    fn probe_window_exhaustion_is_fatal() {
        // Force every insert into the same bucket via capacity 1 and a tiny
        // probe window, so the table fills on the first insert and the
        // second insert (a different key) exhausts the window.
        let table = BucketedHashTable::with_probe_window(1, 1);
        let a = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let b = Kmer::from_ascii(b"TTTTT", 5).unwrap();
        table.find_or_insert(a).unwrap();
        assert!(table.find_or_insert(b).is_err());
    }

    #[test]
    fn random_distinct_kmers_all_round_trip() {
        use rand::Rng;

        let table = BucketedHashTable::new(4096);
        let mut rng = rand::thread_rng();
        let bases = [b'A', b'C', b'G', b'T'];
        let mut kmers = Vec::new();
        while kmers.len() < 500 {
            let seq: Vec<u8> = (0..21).map(|_| bases[rng.gen_range(0..4)]).collect();
            let km = Kmer::from_ascii(&seq, 21).unwrap();
            if table.find(&km).is_some() {
                continue;
            }
            let (vid, was_new) = table.find_or_insert(km.clone()).unwrap();
            assert!(was_new);
            kmers.push((km, vid));
        }

        for (km, vid) in &kmers {
            assert_eq!(table.find(km), Some(*vid));
        }
    }

    #[test]
    fn concurrent_inserts_of_same_kmer_agree_on_one_vertex() {
        use std::sync::Arc;
        let table = Arc::new(BucketedHashTable::new(1024));
        let km = Kmer::from_ascii(b"ACGTACGTACGTACGTACGTA", 21).unwrap();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let table = Arc::clone(&table);
                    let km = km.clone();
                    scope.spawn(move || table.find_or_insert(km).unwrap().0)
                })
                .collect();
            let ids: Vec<VertexId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert!(ids.iter().all(|&id| id == ids[0]));
        });
    }
}
