//! External interface shapes the core depends on but does not implement:
//! a decoded-read source, the per-batch task descriptor, and a read-only
//! view collaborators use to serialize the finished graph. No FASTQ/SAM/BAM
//! parsing lives here — just the types the pipeline and formats modules are
//! built against.

use std::sync::Arc;

use crate::graph::GraphCore;
use crate::hashtable::VertexId;
use crate::kmer::Base;
use crate::pipeline::DuplicateMode;
use crate::stats::Stats;

#[derive(Debug, Clone)]
pub struct ReadRecord {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

impl ReadRecord {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// One unit of work handed from a producer thread to a builder thread: a
/// read (or read pair), the FASTQ quality-score ASCII offset for each mate,
/// whether the aligner had already flagged either mate a PCR duplicate, and
/// the shared task describing how to build from it.
pub struct ReadBatch {
    pub r1: ReadRecord,
    pub r2: Option<ReadRecord>,
    pub fq_offset1: u8,
    pub fq_offset2: u8,
    pub sam_dup1: bool,
    pub sam_dup2: bool,
    pub task: Arc<BuildTask>,
}

/// Per-colour ingestion parameters, shared by every batch drawn from the
/// same input file.
pub struct BuildTask {
    pub colour: usize,
    pub quality_cutoff: u8,
    pub homopolymer_cutoff: usize,
    pub duplicate_mode: DuplicateMode,
    pub stats: Arc<Stats>,
}

/// A source of decoded read batches for one input file. The core never
/// parses FASTQ/SAM/BAM itself; a collaborator implements this over
/// whatever decoder it likes and the pipeline just pulls `ReadBatch`es.
pub trait SequenceSource: Send {
    fn next_batch(&mut self) -> Option<ReadBatch>;
}

/// Read-only view of a finished graph, used by collaborator writers (see
/// `formats::graph`) without exposing `GraphCore`'s internal layout.
pub trait GraphConsumer {
    fn num_colours(&self) -> usize;
    fn capacity(&self) -> usize;
    fn vertex_kmer_ascii(&self, vid: VertexId) -> Option<Vec<u8>>;
    fn colour_present(&self, colour: usize, vid: VertexId) -> bool;
    fn outgoing_bases(&self, colour: usize, vid: VertexId) -> Vec<Base>;
    fn incoming_bases(&self, colour: usize, vid: VertexId) -> Vec<Base>;
}

impl GraphConsumer for GraphCore {
    fn num_colours(&self) -> usize {
        GraphCore::num_colours(self)
    }

    fn capacity(&self) -> usize {
        GraphCore::capacity(self)
    }

    fn vertex_kmer_ascii(&self, vid: VertexId) -> Option<Vec<u8>> {
        self.kmer_at(vid).map(|k| k.to_ascii())
    }

    fn colour_present(&self, colour: usize, vid: VertexId) -> bool {
        GraphCore::colour_present(self, colour, vid)
    }

    fn outgoing_bases(&self, colour: usize, vid: VertexId) -> Vec<Base> {
        [Base::A, Base::C, Base::G, Base::T]
            .into_iter()
            .filter(|&b| self.has_outgoing_edge(colour, vid, b))
            .collect()
    }

    fn incoming_bases(&self, colour: usize, vid: VertexId) -> Vec<Base> {
        [Base::A, Base::C, Base::G, Base::T]
            .into_iter()
            .filter(|&b| self.has_incoming_edge(colour, vid, b))
            .collect()
    }
}
