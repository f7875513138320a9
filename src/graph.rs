//! Thin concurrent layer over `BucketedHashTable` plus the per-vertex arrays
//! (edges, colour presence, read-start bits, path-list heads) that make up
//! the colored de Bruijn graph itself.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::bitset::AtomicBitSet;
use crate::error::Result;
use crate::hashtable::{BucketedHashTable, VertexId};
use crate::kmer::{Base, Kmer, Orientation};

/// Sentinel stored in `path_head` for "no paths recorded at this vertex".
pub const PATH_NULL: u64 = u64::MAX;

/// 8 edge bits per (colour, vertex): outgoing A/C/G/T then incoming A/C/G/T.
const EDGE_BITS_PER_VERTEX: usize = 8;
/// 2 read-start bits per vertex: one per orientation.
const READSTART_BITS_PER_VERTEX: usize = 2;

pub struct GraphCore {
    table: BucketedHashTable,
    num_colours: usize,
    colour_present: Vec<AtomicBitSet>,
    edges: Vec<AtomicBitSet>,
    read_start: AtomicBitSet,
    path_head: Vec<AtomicU64>,
}

impl GraphCore {
    pub fn new(capacity: usize, num_colours: usize) -> Self {
        Self::with_probe_window(capacity, num_colours, 8)
    }

    pub fn with_probe_window(capacity: usize, num_colours: usize, probe_window: usize) -> Self {
        let table = BucketedHashTable::with_probe_window(capacity, probe_window);
        let colour_present = (0..num_colours).map(|_| AtomicBitSet::new(capacity)).collect();
        let edges = (0..num_colours)
            .map(|_| AtomicBitSet::new(capacity * EDGE_BITS_PER_VERTEX))
            .collect();
        let read_start = AtomicBitSet::new(capacity * READSTART_BITS_PER_VERTEX);
        let mut path_head = Vec::with_capacity(capacity);
        path_head.resize_with(capacity, || AtomicU64::new(PATH_NULL));
        Self {
            table,
            num_colours,
            colour_present,
            edges,
            read_start,
            path_head,
        }
    }

    pub fn num_colours(&self) -> usize {
        self.num_colours
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    pub fn kmer_at(&self, vid: VertexId) -> Option<&Kmer> {
        self.table.kmer_at(vid)
    }

    /// Insert (or find) the vertex for `kmer`'s canonical form, recording
    /// that colour `colour` has coverage here. Returns the vertex id and the
    /// orientation of `kmer` relative to the canonical form stored.
    pub fn find_or_add_vertex(&self, kmer: &Kmer, colour: usize) -> Result<(VertexId, Orientation)> {
        let (canon, orient) = kmer.canonical();
        let (vid, _was_new) = self.table.find_or_insert(canon)?;
        self.colour_present[colour].set(vid);
        Ok((vid, orient))
    }

    pub fn find_vertex(&self, kmer: &Kmer) -> Option<(VertexId, Orientation)> {
        let (canon, orient) = kmer.canonical();
        self.table.find(&canon).map(|vid| (vid, orient))
    }

    pub fn colour_present(&self, colour: usize, vid: VertexId) -> bool {
        self.colour_present[colour].get(vid)
    }

    fn edge_bit(vid: VertexId, outgoing: bool, base: Base) -> usize {
        vid * EDGE_BITS_PER_VERTEX + if outgoing { 0 } else { 4 } + base as usize
    }

    /// Record an edge `from_vid -(base)-> to_vid` for `colour`. `base` is the
    /// base extending the read forward, in the read's own orientation;
    /// `from_or`/`to_or` say how each endpoint's canonical kmer relates to
    /// that read orientation, so the bit set on each side reflects that
    /// vertex's own canonical strand.
    pub fn add_edge(
        &self,
        colour: usize,
        from_vid: VertexId,
        from_or: Orientation,
        to_vid: VertexId,
        to_or: Orientation,
        base: Base,
    ) {
        let out_base = match from_or {
            Orientation::Forward => base,
            Orientation::Reverse => base.complement(),
        };
        let in_base = match to_or {
            Orientation::Forward => base,
            Orientation::Reverse => base.complement(),
        };
        let edges = &self.edges[colour];
        edges.set(Self::edge_bit(from_vid, true, out_base));
        edges.set(Self::edge_bit(to_vid, false, in_base));
    }

    pub fn has_outgoing_edge(&self, colour: usize, vid: VertexId, base: Base) -> bool {
        self.edges[colour].get(Self::edge_bit(vid, true, base))
    }

    pub fn has_incoming_edge(&self, colour: usize, vid: VertexId, base: Base) -> bool {
        self.edges[colour].get(Self::edge_bit(vid, false, base))
    }

    pub fn outgoing_edge_count(&self, colour: usize, vid: VertexId) -> usize {
        [Base::A, Base::C, Base::G, Base::T]
            .into_iter()
            .filter(|&b| self.has_outgoing_edge(colour, vid, b))
            .count()
    }

    fn read_start_bit(vid: VertexId, orient: Orientation) -> usize {
        vid * READSTART_BITS_PER_VERTEX + orient.as_index()
    }

    /// Atomic test-and-set on the read-start bit. Returns whether it was
    /// already set before this call.
    pub fn mark_read_start(&self, vid: VertexId, orient: Orientation) -> bool {
        self.read_start.test_and_set(Self::read_start_bit(vid, orient))
    }

    pub fn is_read_start(&self, vid: VertexId, orient: Orientation) -> bool {
        self.read_start.get(Self::read_start_bit(vid, orient))
    }

    pub fn path_head(&self, vid: VertexId) -> u64 {
        self.path_head[vid].load(Ordering::Acquire)
    }

    /// Compare-and-swap the path-list head for `vid`. Used by `PathStore`
    /// when linking a freshly-written record onto the front of the list.
    pub fn cas_path_head(
        &self,
        vid: VertexId,
        current: u64,
        new: u64,
    ) -> std::result::Result<u64, u64> {
        self.path_head[vid].compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_or_add_vertex_sets_colour_bit() {
        let g = GraphCore::new(64, 2);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid, _orient) = g.find_or_add_vertex(&km, 0).unwrap();
        assert!(g.colour_present(0, vid));
        assert!(!g.colour_present(1, vid));
    }

    #[test]
    fn add_edge_sets_both_sides() {
        let g = GraphCore::new(64, 1);
        let a = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let b = Kmer::from_ascii(b"CGTAC", 5).unwrap();
        let (va, oa) = g.find_or_add_vertex(&a, 0).unwrap();
        let (vb, ob) = g.find_or_add_vertex(&b, 0).unwrap();
        g.add_edge(0, va, oa, vb, ob, Base::C);
        assert_eq!(g.outgoing_edge_count(0, va), 1);
    }

    #[test]
    fn read_start_test_and_set_is_idempotent_after_first_call() {
        let g = GraphCore::new(64, 1);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid, orient) = g.find_or_add_vertex(&km, 0).unwrap();
        assert!(!g.mark_read_start(vid, orient));
        assert!(g.mark_read_start(vid, orient));
        assert!(g.is_read_start(vid, orient));
    }

    #[test]
    fn path_head_starts_null_and_cas_updates() {
        let g = GraphCore::new(64, 1);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid, _) = g.find_or_add_vertex(&km, 0).unwrap();
        assert_eq!(g.path_head(vid), PATH_NULL);
        assert_eq!(g.cas_path_head(vid, PATH_NULL, 42), Ok(PATH_NULL));
        assert_eq!(g.path_head(vid), 42);
    }
}
