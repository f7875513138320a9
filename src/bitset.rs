//! Typed atomic bit-set abstraction used for per-vertex edge, colour, and
//! read-start bits.

use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed-length, concurrently-mutable bit set backed by `AtomicU64` words.
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
}

impl AtomicBitSet {
    pub fn new(n_bits: usize) -> Self {
        let n_words = n_bits.div_ceil(64);
        let mut words = Vec::with_capacity(n_words);
        words.resize_with(n_words, || AtomicU64::new(0));
        Self { words }
    }

    #[inline]
    fn locate(i: usize) -> (usize, u64) {
        (i / 64, 1u64 << (i % 64))
    }

    pub fn get(&self, i: usize) -> bool {
        let (word, mask) = Self::locate(i);
        self.words[word].load(Ordering::Acquire) & mask != 0
    }

    /// Atomically set bit `i`, returning whether it was already set.
    pub fn test_and_set(&self, i: usize) -> bool {
        let (word, mask) = Self::locate(i);
        let prev = self.words[word].fetch_or(mask, Ordering::AcqRel);
        prev & mask != 0
    }

    pub fn set(&self, i: usize) {
        let (word, mask) = Self::locate(i);
        self.words[word].fetch_or(mask, Ordering::AcqRel);
    }

    /// OR every word of `src` into `dst`, word for word. Used to merge
    /// colour-presence bitsets across a PathStore merge or a colour remap.
    pub fn or_into(dst: &AtomicBitSet, src: &AtomicBitSet) {
        assert_eq!(dst.words.len(), src.words.len());
        for (d, s) in dst.words.iter().zip(src.words.iter()) {
            let s_val = s.load(Ordering::Acquire);
            if s_val != 0 {
                d.fetch_or(s_val, Ordering::AcqRel);
            }
        }
    }

    pub fn len_bits(&self) -> usize {
        self.words.len() * 64
    }
}
