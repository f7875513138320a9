//! Second pass over the input: walk each read across the finished graph and
//! record the bases taken at every branch point as a `PathRecord`.

use crate::error::Result;
use crate::fatal;
use crate::graph::GraphCore;
use crate::kmer::{Base, Kmer};
use crate::msgpool::{MessagePool, MSGPOOLRSIZE};
use crate::pathstore::{PathRecord, PathStore, WriteMode};
use crate::source::ReadRecord;

/// One read plus the colour/write-mode it should be threaded under.
pub struct ThreadBatch {
    pub read: ReadRecord,
    pub colour: usize,
    pub write_mode: WriteMode,
}

pub trait ThreadSource: Send {
    fn next_read(&mut self) -> Option<ThreadBatch>;
}

struct BasePacker {
    bytes: Vec<u8>,
    bit_pos: usize,
}

impl BasePacker {
    fn new() -> Self {
        Self { bytes: Vec::new(), bit_pos: 0 }
    }

    fn push(&mut self, base: Base) {
        if self.bit_pos == 0 {
            self.bytes.push(0);
        }
        let byte = self.bytes.last_mut().unwrap();
        *byte |= (base as u8) << self.bit_pos;
        self.bit_pos = (self.bit_pos + 2) % 8;
    }

    fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

fn colset_singleton(colour: usize, num_colours: usize) -> Vec<u8> {
    let mut colset = vec![0u8; num_colours.div_ceil(8)];
    colset[colour / 8] |= 1 << (colour % 8);
    colset
}

/// Walk `read` across `graph`'s k-mers, recording a `PathRecord` starting
/// at each branch vertex (out-degree > 1 for `colour`) and running until
/// the next branch vertex or the end of the read. Returns the number of
/// records emitted (including those merged by dedup rather than appended).
pub fn thread_read(
    graph: &GraphCore,
    path_store: &PathStore,
    read: &ReadRecord,
    k: usize,
    colour: usize,
    mode: WriteMode,
) -> Result<u32> {
    if read.seq.len() < k {
        return Ok(0);
    }

    let mut vids = Vec::new();
    for i in 0..=read.seq.len() - k {
        let window = &read.seq[i..i + k];
        if window.iter().any(|&c| Base::from_char(c).is_none()) {
            break;
        }
        let km = Kmer::from_ascii(window, k)?;
        match graph.find_vertex(&km) {
            Some(entry) => vids.push(entry),
            None => break,
        }
    }
    if vids.len() < 2 {
        return Ok(0);
    }

    let mut emitted = 0u32;
    let mut i = 0;
    while i + 1 < vids.len() {
        let (vid, orient) = vids[i];
        if graph.outgoing_edge_count(colour, vid) <= 1 {
            i += 1;
            continue;
        }

        let mut packer = BasePacker::new();
        let mut len = 0u32;
        let mut j = i;
        while j + 1 < vids.len() {
            let extending_base =
                Base::from_char(read.seq[j + k]).expect("kmer window already validated as ACGT");
            packer.push(extending_base);
            len += 1;
            j += 1;
            let (next_vid, _) = vids[j];
            if graph.outgoing_edge_count(colour, next_vid) > 1 {
                break;
            }
        }

        if len > 0 {
            let record = PathRecord {
                colset: colset_singleton(colour, graph.num_colours()),
                seq_bases: packer.into_bytes(),
                len,
                orientation: orient,
            };
            path_store.find_or_add(graph, vid, record, mode)?;
            emitted += 1;
        }
        i = j.max(i + 1);
    }

    Ok(emitted)
}

pub struct PathThreader {
    pub k: usize,
    pub num_threads: usize,
}

impl PathThreader {
    pub fn new(k: usize, num_threads: usize) -> Self {
        Self { k, num_threads }
    }

    pub fn run(&self, graph: &GraphCore, path_store: &PathStore, mut sources: Vec<Box<dyn ThreadSource>>) {
        let pool: MessagePool<ThreadBatch> = MessagePool::new(MSGPOOLRSIZE);
        let rx = pool.receiver();

        std::thread::scope(|scope| {
            for mut source in sources.drain(..) {
                let tx = pool.sender();
                scope.spawn(move || {
                    while let Some(batch) = source.next_read() {
                        if tx.send(batch).is_err() {
                            break;
                        }
                    }
                });
            }
            pool.close_local_sender();

            for _ in 0..self.num_threads {
                let rx = rx.clone();
                scope.spawn(|| {
                    while let Ok(batch) = rx.recv() {
                        let result =
                            thread_read(graph, path_store, &batch.read, self.k, batch.colour, batch.write_mode);
                        if let Err(err) = result {
                            fatal::die("thread", &err);
                        }
                    }
                });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashtable::VertexId;

    fn read(seq: &[u8]) -> ReadRecord {
        ReadRecord { seq: seq.to_vec(), qual: vec![b'I'; seq.len()] }
    }

    fn build_branching_graph() -> GraphCore {
        // Build a graph with a branch: ACGTA -> CGTAC and ACGTA -> CGTAG,
        // giving vertex for ACGTA an out-degree of 2 under colour 0.
        let graph = GraphCore::new(64, 1);
        crate::pipeline::build_graph_from_str(&graph, b"ACGTACGTA", 5, 0).unwrap();
        crate::pipeline::build_graph_from_str(&graph, b"ACGTAGGTA", 5, 0).unwrap();
        graph
    }

    #[test]
    fn thread_read_emits_nothing_below_two_kmers() {
        let graph = GraphCore::new(64, 1);
        let store = PathStore::new(4096, 1, false);
        let emitted = thread_read(&graph, &store, &read(b"ACGT"), 5, 0, WriteMode::InsertOnly).unwrap();
        assert_eq!(emitted, 0);
    }

    #[test]
    fn thread_read_records_a_path_through_a_branch() {
        let graph = build_branching_graph();
        let store = PathStore::new(4096, 1, false);
        let emitted =
            thread_read(&graph, &store, &read(b"ACGTACGTA"), 5, 0, WriteMode::InsertOnly).unwrap();
        assert_eq!(emitted, 1);

        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid, _orient): (VertexId, _) = graph.find_vertex(&km).unwrap();
        assert_eq!(store.record_count_from(&graph, vid), 1);
    }
}
