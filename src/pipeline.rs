//! Read ingestion: contig scanning, k-mer/edge insertion, duplicate
//! suppression, and the producer/consumer worker pool that drives it all.

use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::fatal;
use crate::graph::GraphCore;
use crate::hashtable::VertexId;
use crate::kmer::{Base, Kmer, Orientation};
use crate::msgpool::{MessagePool, MSGPOOLRSIZE};
use crate::source::{ReadBatch, ReadRecord, SequenceSource};
use crate::stats::Stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    Keep,
    RemoveDupsSe,
    RemoveDupsPe,
}

/// Per-base validity: bad quality, non-ACGT, or past the homopolymer-run
/// cutoff. One pass over the read; contig scanning is a second pass over
/// this array rather than re-deriving it per window.
fn classify_bad(seq: &[u8], qual: &[u8], fq_offset: u8, q_cut: u8, hp_cut: usize) -> Vec<bool> {
    let mut bad = vec![false; seq.len()];
    let mut run_base = 0u8;
    let mut run_len = 0usize;
    for (i, &c) in seq.iter().enumerate() {
        if Base::from_char(c).is_none() {
            bad[i] = true;
        } else if let Some(&q) = qual.get(i) {
            if q.saturating_sub(fq_offset) < q_cut {
                bad[i] = true;
            }
        }
        if c == run_base {
            run_len += 1;
        } else {
            run_base = c;
            run_len = 1;
        }
        if run_len > hp_cut {
            bad[i] = true;
        }
    }
    bad
}

/// First offset `i` (at or after `start`) such that the `k`-base window
/// `[i, i+k)` contains no disqualifying base; `bad.len()` if none exists.
pub fn seq_contig_start(bad: &[bool], start: usize, k: usize) -> usize {
    let n = bad.len();
    let mut i = start;
    while i + k <= n {
        if bad[i..i + k].iter().all(|&b| !b) {
            return i;
        }
        i += 1;
    }
    n
}

/// Extend the contig window forward from `contig_start + k` until a
/// disqualifying base is found or the read ends.
pub fn seq_contig_end(bad: &[bool], contig_start: usize, k: usize) -> usize {
    let n = bad.len();
    let mut end = contig_start + k;
    while end < n && !bad[end] {
        end += 1;
    }
    end
}

/// Insert every k-mer of `contig` and the edges between consecutive k-mers
/// into `graph` under `colour`. Returns `(kmers_inserted, edges_inserted)`.
pub fn build_graph_from_str(
    graph: &GraphCore,
    contig: &[u8],
    k: usize,
    colour: usize,
) -> Result<(u64, u64)> {
    if contig.len() < k {
        return Ok((0, 0));
    }
    let mut prev: Option<(VertexId, Orientation)> = None;
    let mut kmers = 0u64;
    let mut edges = 0u64;
    for i in 0..=contig.len() - k {
        let km = Kmer::from_ascii(&contig[i..i + k], k)?;
        let (vid, orient) = graph.find_or_add_vertex(&km, colour)?;
        kmers += 1;
        if let Some((prev_vid, prev_orient)) = prev {
            let extending_base = Base::from_char(contig[i + k - 1])
                .expect("contig bases were validated during contig scanning");
            graph.add_edge(colour, prev_vid, prev_orient, vid, orient, extending_base);
            edges += 1;
        }
        prev = Some((vid, orient));
    }
    Ok((kmers, edges))
}

/// Scan `read` for valid contigs and load each one into `graph`, updating
/// `stats` along the way. A read with no valid contig at all counts as bad.
pub fn load_read(
    graph: &GraphCore,
    stats: &Stats,
    read: &ReadRecord,
    fq_offset: u8,
    k: usize,
    q_cut: u8,
    hp_cut: usize,
    colour: usize,
) -> Result<()> {
    let bad = classify_bad(&read.seq, &read.qual, fq_offset, q_cut, hp_cut);

    let mut cursor = 0;
    let mut loaded_any = false;
    loop {
        let start = seq_contig_start(&bad, cursor, k);
        if start + k > read.seq.len() {
            break;
        }
        let end = seq_contig_end(&bad, start, k);
        let contig = &read.seq[start..end];
        let (kmers, _edges) = build_graph_from_str(graph, contig, k, colour)?;
        if kmers > 0 {
            loaded_any = true;
            stats.record_read_length(contig.len());
            stats.total_bases_loaded.fetch_add(contig.len() as u64, Ordering::Relaxed);
            stats.kmers_loaded.fetch_add(kmers, Ordering::Relaxed);
            stats.contigs_loaded.fetch_add(1, Ordering::Relaxed);
        }
        cursor = end + 1;
    }

    if !loaded_any {
        stats.total_bad_reads.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}

fn first_acgt_window(seq: &[u8], k: usize) -> Option<&[u8]> {
    if seq.len() < k {
        return None;
    }
    (0..=seq.len() - k)
        .map(|i| &seq[i..i + k])
        .find(|window| window.iter().all(|&c| Base::from_char(c).is_some()))
}

/// Locate the first valid k-mer in `read`, insert its vertex, and
/// test-and-set the read-start bit for its orientation. A read with no
/// valid k-mer at all is vacuously novel.
pub fn seq_read_is_novel(graph: &GraphCore, read: &ReadRecord, k: usize, colour: usize) -> Result<bool> {
    match first_acgt_window(&read.seq, k) {
        None => Ok(true),
        Some(window) => {
            let km = Kmer::from_ascii(window, k)?;
            let (vid, orient) = graph.find_or_add_vertex(&km, colour)?;
            Ok(!graph.mark_read_start(vid, orient))
        }
    }
}

/// Pair-level novelty: the pair is novel iff at least one mate's read-start
/// bit was freshly set. A single-end "pair" (no `r2`) is novel iff `r1` is.
pub fn seq_reads_are_novel(
    graph: &GraphCore,
    r1: &ReadRecord,
    r2: Option<&ReadRecord>,
    k: usize,
    colour: usize,
) -> Result<bool> {
    let novel1 = seq_read_is_novel(graph, r1, k, colour)?;
    match r2 {
        Some(r2) => {
            let novel2 = seq_read_is_novel(graph, r2, k, colour)?;
            Ok(novel1 || novel2)
        }
        None => Ok(novel1),
    }
}

fn process_batch(graph: &GraphCore, k: usize, batch: ReadBatch) -> Result<()> {
    let task = &batch.task;
    let nbases = batch.r1.len() + batch.r2.as_ref().map(ReadRecord::len).unwrap_or(0);
    task.stats.total_bases_read.fetch_add(nbases as u64, Ordering::Relaxed);

    // A single-end read has no mate to flag, so its absent mate is treated
    // as vacuously a duplicate: `sam_dup1 && sam_dup2` then reduces to
    // `sam_dup1`, matching the paired-end expression's shape.
    let effective_sam_dup2 = batch.r2.as_ref().map(|_| batch.sam_dup2).unwrap_or(true);
    let dup_by_sam_flags = batch.sam_dup1 && effective_sam_dup2;

    let dup_by_novelty = match (&batch.r2, task.duplicate_mode) {
        (Some(r2), DuplicateMode::RemoveDupsPe) => {
            !seq_reads_are_novel(graph, &batch.r1, Some(r2), k, task.colour)?
        }
        (None, DuplicateMode::RemoveDupsSe) => !seq_read_is_novel(graph, &batch.r1, k, task.colour)?,
        _ => false,
    };

    let n_reads = if batch.r2.is_some() { 2 } else { 1 };

    if dup_by_sam_flags || dup_by_novelty {
        task.stats.total_dup_reads.fetch_add(n_reads, Ordering::Relaxed);
        return Ok(());
    }
    task.stats.total_good_reads.fetch_add(n_reads, Ordering::Relaxed);

    load_read(
        graph,
        &task.stats,
        &batch.r1,
        batch.fq_offset1,
        k,
        task.quality_cutoff,
        task.homopolymer_cutoff,
        task.colour,
    )?;
    if let Some(r2) = &batch.r2 {
        load_read(
            graph,
            &task.stats,
            r2,
            batch.fq_offset2,
            k,
            task.quality_cutoff,
            task.homopolymer_cutoff,
            task.colour,
        )?;
    }
    Ok(())
}

/// Orchestrates one producer thread per input source and a fixed pool of
/// builder threads draining a shared, bounded `MessagePool`.
pub struct IngestPipeline {
    pub k: usize,
    pub num_build_threads: usize,
}

impl IngestPipeline {
    pub fn new(k: usize, num_build_threads: usize) -> Self {
        Self { k, num_build_threads }
    }

    pub fn run(&self, graph: &GraphCore, mut sources: Vec<Box<dyn SequenceSource>>) {
        let pool: MessagePool<ReadBatch> = MessagePool::new(MSGPOOLRSIZE);
        let rx = pool.receiver();

        std::thread::scope(|scope| {
            for mut source in sources.drain(..) {
                let tx = pool.sender();
                scope.spawn(move || {
                    while let Some(batch) = source.next_batch() {
                        if tx.send(batch).is_err() {
                            break;
                        }
                    }
                });
            }
            pool.close_local_sender();

            for _ in 0..self.num_build_threads {
                let rx = rx.clone();
                scope.spawn(|| {
                    while let Ok(batch) = rx.recv() {
                        if let Err(err) = process_batch(graph, self.k, batch) {
                            fatal::die("ingest", &err);
                        }
                    }
                });
            }
        });
    }
}
