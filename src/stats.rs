//! Ingestion counters, shared across builder threads via 64-bit atomics plus
//! a mutex-guarded read-length histogram.

use std::sync::atomic::{AtomicU64, Ordering};

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

pub struct Stats {
    pub total_bases_read: AtomicU64,
    pub total_dup_reads: AtomicU64,
    pub total_bad_reads: AtomicU64,
    pub total_good_reads: AtomicU64,
    pub total_bases_loaded: AtomicU64,
    pub kmers_loaded: AtomicU64,
    pub contigs_loaded: AtomicU64,
    readlen_histogram: Mutex<Histogram<u64>>,
}

impl Stats {
    pub fn new() -> Self {
        // 1 base to 10kb reads, 3 significant digits; matches the dynamic
        // range a fixed readlen_count_array would otherwise need to cover.
        let histogram = Histogram::new_with_bounds(1, 10_000, 3).expect("valid histogram bounds");
        Self {
            total_bases_read: AtomicU64::new(0),
            total_dup_reads: AtomicU64::new(0),
            total_bad_reads: AtomicU64::new(0),
            total_good_reads: AtomicU64::new(0),
            total_bases_loaded: AtomicU64::new(0),
            kmers_loaded: AtomicU64::new(0),
            contigs_loaded: AtomicU64::new(0),
            readlen_histogram: Mutex::new(histogram),
        }
    }

    pub fn record_read_length(&self, len: usize) {
        let clamped = (len as u64).clamp(1, 10_000);
        self.readlen_histogram
            .lock()
            .record(clamped)
            .expect("length within configured histogram bounds");
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let hist = self.readlen_histogram.lock();
        StatsSnapshot {
            total_bases_read: self.total_bases_read.load(Ordering::Relaxed),
            total_dup_reads: self.total_dup_reads.load(Ordering::Relaxed),
            total_bad_reads: self.total_bad_reads.load(Ordering::Relaxed),
            total_good_reads: self.total_good_reads.load(Ordering::Relaxed),
            total_bases_loaded: self.total_bases_loaded.load(Ordering::Relaxed),
            kmers_loaded: self.kmers_loaded.load(Ordering::Relaxed),
            contigs_loaded: self.contigs_loaded.load(Ordering::Relaxed),
            readlen_mean: hist.mean(),
            readlen_p50: hist.value_at_quantile(0.5),
            readlen_p99: hist.value_at_quantile(0.99),
            readlen_max: hist.max(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub total_bases_read: u64,
    pub total_dup_reads: u64,
    pub total_bad_reads: u64,
    pub total_good_reads: u64,
    pub total_bases_loaded: u64,
    pub kmers_loaded: u64,
    pub contigs_loaded: u64,
    pub readlen_mean: f64,
    pub readlen_p50: u64,
    pub readlen_p99: u64,
    pub readlen_max: u64,
}
