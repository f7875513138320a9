//! End-to-end scenarios over the public `cortex_graph` API.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use cortex_graph::graph::GraphCore;
use cortex_graph::kmer::{Kmer, Orientation};
use cortex_graph::pathstore::{PathRecord, PathStore, WriteMode};
use cortex_graph::pipeline::{build_graph_from_str, load_read, DuplicateMode};
use cortex_graph::source::{BuildTask, ReadRecord};
use cortex_graph::stats::Stats;

fn read(seq: &[u8]) -> ReadRecord {
    ReadRecord { seq: seq.to_vec(), qual: vec![b'I'; seq.len()] }
}

fn process(
    graph: &GraphCore,
    stats: &Arc<Stats>,
    task: &Arc<BuildTask>,
    r1: &[u8],
    r2: Option<&[u8]>,
) {
    use cortex_graph::pipeline::seq_reads_are_novel;

    let read1 = read(r1);
    let read2 = r2.map(read);
    let nbases = read1.len() + read2.as_ref().map(ReadRecord::len).unwrap_or(0);
    stats.total_bases_read.fetch_add(nbases as u64, Ordering::Relaxed);

    let is_dup = match (&read2, task.duplicate_mode) {
        (Some(mate), DuplicateMode::RemoveDupsPe) => {
            !seq_reads_are_novel(graph, &read1, Some(mate), 5, task.colour).unwrap()
        }
        (None, DuplicateMode::RemoveDupsSe) => {
            use cortex_graph::pipeline::seq_read_is_novel;
            !seq_read_is_novel(graph, &read1, 5, task.colour).unwrap()
        }
        _ => false,
    };

    if is_dup {
        stats
            .total_dup_reads
            .fetch_add(if read2.is_some() { 2 } else { 1 }, Ordering::Relaxed);
        return;
    }
    stats
        .total_good_reads
        .fetch_add(if read2.is_some() { 2 } else { 1 }, Ordering::Relaxed);

    load_read(graph, stats, &read1, 33, 5, 0, 100, task.colour).unwrap();
    if let Some(mate) = &read2 {
        load_read(graph, stats, mate, 33, 5, 0, 100, task.colour).unwrap();
    }
}

#[test]
fn scenario_a_trivial_build() {
    let graph = GraphCore::new(64, 1);
    let (kmers, edges) = build_graph_from_str(&graph, b"ACGTACGTA", 5, 0).unwrap();

    assert_eq!(kmers, 5);
    assert_eq!(edges, 4);

    for window in [b"ACGTA", b"CGTAC", b"GTACG", b"TACGT"] {
        let km = Kmer::from_ascii(window, 5).unwrap();
        let (vid, _orient) = graph.find_vertex(&km).expect("kmer should be present");
        assert!(graph.colour_present(0, vid));
    }

    let store = PathStore::new(4096, 1, false);
    let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
    let (vid, _) = graph.find_vertex(&km).unwrap();
    assert_eq!(store.record_count_from(&graph, vid), 0);
}

#[test]
fn scenario_b_duplicate_suppression() {
    let graph = GraphCore::new(64, 1);
    let stats = Arc::new(Stats::new());
    let task = Arc::new(BuildTask {
        colour: 0,
        quality_cutoff: 0,
        homopolymer_cutoff: 100,
        duplicate_mode: DuplicateMode::RemoveDupsSe,
        stats: stats.clone(),
    });

    for _ in 0..3 {
        process(&graph, &stats, &task, b"ACGTACGTACGTA", None);
    }

    assert_eq!(stats.total_good_reads.load(Ordering::Relaxed), 1);
    assert_eq!(stats.total_dup_reads.load(Ordering::Relaxed), 2);
}

#[test]
fn scenario_c_paired_end_novelty() {
    let graph = GraphCore::new(64, 1);
    let stats = Arc::new(Stats::new());
    let task = Arc::new(BuildTask {
        colour: 0,
        quality_cutoff: 0,
        homopolymer_cutoff: 100,
        duplicate_mode: DuplicateMode::RemoveDupsPe,
        stats: stats.clone(),
    });

    process(&graph, &stats, &task, b"ACGTACGT", Some(b"TTTTTTTT"));
    process(&graph, &stats, &task, b"ACGTACGT", Some(b"TTTTTTTT"));

    assert_eq!(stats.total_good_reads.load(Ordering::Relaxed), 2);
    assert_eq!(stats.total_dup_reads.load(Ordering::Relaxed), 2);
}

#[test]
fn scenario_d_path_deduplication() {
    let graph = GraphCore::new(16, 1);
    let store = PathStore::new(4096, 2, false);
    let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
    let (vid, _) = graph.find_or_add_vertex(&km, 0).unwrap();

    let a = store
        .find_or_add(
            &graph,
            vid,
            PathRecord { colset: vec![0b01], seq_bases: vec![0xAA], len: 4, orientation: Orientation::Forward },
            WriteMode::Dedup,
        )
        .unwrap();
    let b = store
        .find_or_add(
            &graph,
            vid,
            PathRecord { colset: vec![0b10], seq_bases: vec![0xAA], len: 4, orientation: Orientation::Forward },
            WriteMode::Dedup,
        )
        .unwrap();

    assert_eq!(a, b);
    assert_eq!(store.record_count_from(&graph, vid), 1);
    assert_eq!(store.colset_at(a), vec![0b11]);
    assert_eq!(store.iter_arena().len(), 1);
}

#[test]
fn scenario_e_arena_overflow_is_fatal() {
    let graph = GraphCore::new(16, 1);
    let store = PathStore::new(40, 1, false);
    let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
    let (vid, _) = graph.find_or_add_vertex(&km, 0).unwrap();

    let result = store.find_or_add(
        &graph,
        vid,
        PathRecord { colset: vec![1], seq_bases: vec![0xFF; 32], len: 128, orientation: Orientation::Forward },
        WriteMode::InsertOnly,
    );
    assert!(result.is_err());
}

#[test]
fn scenario_f_concurrent_ingestion_agrees_on_edge_state() {
    let graph = Arc::new(GraphCore::new(256, 1));
    let reads: Vec<&[u8]> = vec![b"ACGTACGTA", b"ACGTAGGTA", b"TTTTTACGT", b"GGGGGCGTA"];

    std::thread::scope(|scope| {
        for chunk in reads.chunks(1) {
            let graph = Arc::clone(&graph);
            let chunk = chunk.to_vec();
            scope.spawn(move || {
                for r in chunk {
                    build_graph_from_str(&graph, r, 5, 0).unwrap();
                }
            });
        }
    });

    let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
    let (vid, _orient) = graph.find_vertex(&km).expect("ACGTA should have been inserted");
    assert!(graph.colour_present(0, vid));
    assert!(graph.outgoing_edge_count(0, vid) >= 1);
}

#[test]
fn invariant_path_list_terminates_and_counts_match_appends() {
    let graph = GraphCore::new(16, 1);
    let store = PathStore::new(8192, 1, false);
    let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
    let (vid, _) = graph.find_or_add_vertex(&km, 0).unwrap();

    for i in 0..10u8 {
        store
            .find_or_add(
                &graph,
                vid,
                PathRecord { colset: vec![1], seq_bases: vec![i], len: 4, orientation: Orientation::Forward },
                WriteMode::InsertOnly,
            )
            .unwrap();
    }

    assert_eq!(store.record_count_from(&graph, vid), 10);
    store.integrity_check();
}
