//! Bump-allocated arena of packed path records, plus an optional
//! content-addressed secondary index for deduplication.
//!
//! Record layout, packed back-to-back in the arena:
//!
//! ```text
//! [ prev: u64 little-endian ][ colset: n_colour_bytes ][ len_and_orient: u16 ][ seq: ceil(len*2/8) bytes ]
//! ```
//!
//! `prev` is the arena offset of the previous record in this vertex's list
//! (or `PATH_NULL`), `colset` is one bit per colour, `len_and_orient` packs
//! a 15-bit path length below a 1-bit walk orientation (the high bit), and
//! `seq` is the packed 2-bit-per-base path sequence.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{CortexError, Result};
use crate::graph::{GraphCore, PATH_NULL};
use crate::hashtable::VertexId;
use crate::kmer::Orientation;

/// Bytes reserved at the tail of the arena that a record is never allowed to
/// spill into; guards against an off-by-one write landing past `end`.
const PSTORE_PADDING: usize = 16;

/// Largest path length the 15-bit length field can hold.
pub const MAX_PATH_LEN: u32 = 0x7FFF;
const ORIENT_BIT: u16 = 0x8000;
const LEN_MASK: u16 = 0x7FFF;

/// Pack a path length and its walk orientation into the wire `len_and_orient`
/// field: 15 bits of length, then the orientation as the top bit.
pub fn pack_len_and_orient(len: u32, orientation: Orientation) -> Result<u16> {
    if len > MAX_PATH_LEN {
        return Err(CortexError::InvalidArgument(format!(
            "path length {len} exceeds the 15-bit length field (max {MAX_PATH_LEN})"
        )));
    }
    let orient_bit = match orientation {
        Orientation::Forward => 0u16,
        Orientation::Reverse => ORIENT_BIT,
    };
    Ok(len as u16 | orient_bit)
}

/// Inverse of [`pack_len_and_orient`].
pub fn unpack_len_and_orient(raw: u16) -> (u32, Orientation) {
    let len = (raw & LEN_MASK) as u32;
    let orientation = if raw & ORIENT_BIT != 0 { Orientation::Reverse } else { Orientation::Forward };
    (len, orientation)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    InsertOnly,
    Dedup,
}

/// A decoded view of a path record, independent of its arena encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    pub colset: Vec<u8>,
    pub seq_bases: Vec<u8>, // 2 bits/base packed, `len` implied by bit count tracked separately
    pub len: u32,
    pub orientation: Orientation,
}

impl PathRecord {
    fn encoded_len(&self) -> usize {
        8 + self.colset.len() + 2 + self.seq_bases.len()
    }

    fn encode_into(&self, buf: &mut [u8], prev: u64) -> Result<()> {
        let packed = pack_len_and_orient(self.len, self.orientation)?;
        buf[0..8].copy_from_slice(&prev.to_le_bytes());
        let mut off = 8;
        buf[off..off + self.colset.len()].copy_from_slice(&self.colset);
        off += self.colset.len();
        buf[off..off + 2].copy_from_slice(&packed.to_le_bytes());
        off += 2;
        buf[off..off + self.seq_bases.len()].copy_from_slice(&self.seq_bases);
        Ok(())
    }
}

/// A colour remap applied when folding path records from one colour space
/// into another — e.g. loading a single-colour scratch graph's paths into
/// colour `k` of a multi-colour main graph. Old colour `i` lands at
/// `mapping[i]`, or is dropped entirely if `mapping[i]` is `None`.
#[derive(Debug, Clone)]
pub struct FileFilter {
    mapping: Vec<Option<usize>>,
    n_colours_out: usize,
}

impl FileFilter {
    pub fn new(mapping: Vec<Option<usize>>, n_colours_out: usize) -> Self {
        Self { mapping, n_colours_out }
    }

    fn remap_colset(&self, colset: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; self.n_colours_out.div_ceil(8)];
        for (old_colour, target) in self.mapping.iter().enumerate() {
            let Some(new_colour) = *target else { continue };
            let byte = old_colour / 8;
            let bit = old_colour % 8;
            if byte < colset.len() && colset[byte] & (1 << bit) != 0 {
                out[new_colour / 8] |= 1 << (new_colour % 8);
            }
        }
        out
    }

    fn colset_is_empty(colset: &[u8]) -> bool {
        colset.iter().all(|&b| b == 0)
    }
}

/// A decoded arena record, independent of its byte layout, for
/// collaborator consumption (see `PathStore::iter_arena`).
#[derive(Debug, Clone)]
pub struct ArenaRecord {
    pub offset: u64,
    pub prev: u64,
    pub colset: Vec<u8>,
    pub seq_bases: Vec<u8>,
    pub len: u32,
    pub orientation: Orientation,
}

struct DecodedAt<'a> {
    prev: u64,
    colset: &'a [u8],
    len: u32,
    orientation: Orientation,
    seq_bases: &'a [u8],
}

pub struct PathStore {
    arena: UnsafeCell<Vec<u8>>,
    next: AtomicU64,
    end: usize,
    n_colour_bytes: usize,
    /// Content-addressed index from `(vertex, len, orientation, seq)` to
    /// arena offset, guarded the same way `BucketedHashTable` guards its
    /// buckets — one lock per bucket group, checked under the lock before
    /// insert.
    path_hash: Option<Mutex<rustc_hash::FxHashMap<(VertexId, u32, Orientation, Vec<u8>), u64>>>,
}

impl PathStore {
    pub fn new(mem_bytes: usize, n_colours: usize, with_hash_index: bool) -> Self {
        assert!(mem_bytes > PSTORE_PADDING, "path store arena too small");
        let n_colour_bytes = n_colours.div_ceil(8);
        Self {
            arena: UnsafeCell::new(vec![0u8; mem_bytes]),
            next: AtomicU64::new(0),
            end: mem_bytes,
            n_colour_bytes,
            path_hash: with_hash_index.then(|| Mutex::new(rustc_hash::FxHashMap::default())),
        }
    }

    pub fn bytes_used(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    fn arena(&self) -> &[u8] {
        // SAFETY: readers only observe bytes at offsets below `next` (Acquire
        // loaded), and writers only publish an offset range via `reserve`'s
        // CAS (Release) after finishing their writes to it.
        unsafe { &*self.arena.get() }
    }

    fn decode_at(&self, offset: u64) -> DecodedAt<'_> {
        let arena = self.arena();
        let off = offset as usize;
        let prev = u64::from_le_bytes(arena[off..off + 8].try_into().unwrap());
        let mut p = off + 8;
        let colset = &arena[p..p + self.n_colour_bytes];
        p += self.n_colour_bytes;
        let raw = u16::from_le_bytes(arena[p..p + 2].try_into().unwrap());
        p += 2;
        let (len, orientation) = unpack_len_and_orient(raw);
        let seq_len = (len as usize * 2).div_ceil(8);
        let seq_bases = &arena[p..p + seq_len];
        DecodedAt {
            prev,
            colset,
            len,
            orientation,
            seq_bases,
        }
    }

    /// Reserve `n` bytes at the front of the arena via CAS, failing with
    /// `OutOfMemory` if that would spill into the padding region.
    fn reserve(&self, n: usize) -> Result<u64> {
        loop {
            let cur = self.next.load(Ordering::Acquire);
            let new = cur + n as u64;
            if new as usize > self.end - PSTORE_PADDING {
                return Err(CortexError::OutOfMemory(format!(
                    "path store arena exhausted: need {n} bytes, {} remaining",
                    self.end.saturating_sub(PSTORE_PADDING).saturating_sub(cur as usize)
                )));
            }
            if self
                .next
                .compare_exchange(cur, new, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(cur);
            }
        }
    }

    fn arena_mut_slice(&self, offset: u64, len: usize) -> &mut [u8] {
        // SAFETY: `offset..offset+len` was exclusively reserved for this
        // writer by `reserve`'s CAS, so no other call can alias this range.
        unsafe {
            let ptr = (*self.arena.get()).as_mut_ptr().add(offset as usize);
            std::slice::from_raw_parts_mut(ptr, len)
        }
    }

    fn matches(&self, at: &DecodedAt<'_>, record: &PathRecord) -> bool {
        at.len == record.len
            && at.orientation == record.orientation
            && at.seq_bases == record.seq_bases.as_slice()
    }

    fn or_colset_at(&self, offset: u64, incoming: &[u8]) {
        let off = offset as usize + 8;
        let slot = self.arena_mut_slice(off as u64, self.n_colour_bytes);
        for (byte, inc) in slot.iter_mut().zip(incoming.iter()) {
            // Atomic byte-wise OR: a plain `|=` would race with another
            // writer touching a different bit of the same byte, so go
            // through an AtomicU8 view of the same memory instead.
            let atomic_byte = unsafe { &*(byte as *mut u8 as *const std::sync::atomic::AtomicU8) };
            atomic_byte.fetch_or(*inc, Ordering::AcqRel);
        }
    }

    /// Append or find-and-merge a path record at `vid`, per `mode`.
    pub fn find_or_add(
        &self,
        graph: &GraphCore,
        vid: VertexId,
        record: PathRecord,
        mode: WriteMode,
    ) -> Result<u64> {
        pack_len_and_orient(record.len, record.orientation)?;
        if mode == WriteMode::Dedup {
            if let Some(offset) = self.find_duplicate(graph, vid, &record) {
                self.or_colset_at(offset, &record.colset);
                return Ok(offset);
            }
        }
        self.append(graph, vid, record)
    }

    /// Remap `record`'s colset through `filter` before inserting. If the
    /// remapped colset is empty — every source colour the record carried was
    /// dropped by the filter — this is a no-op and returns `PATH_NULL`
    /// without touching the arena.
    pub fn find_or_add_filtered(
        &self,
        graph: &GraphCore,
        vid: VertexId,
        record: PathRecord,
        mode: WriteMode,
        filter: &FileFilter,
    ) -> Result<u64> {
        let remapped_colset = filter.remap_colset(&record.colset);
        if FileFilter::colset_is_empty(&remapped_colset) {
            return Ok(PATH_NULL);
        }
        let remapped = PathRecord { colset: remapped_colset, ..record };
        self.find_or_add(graph, vid, remapped, mode)
    }

    fn find_duplicate(&self, graph: &GraphCore, vid: VertexId, record: &PathRecord) -> Option<u64> {
        let mut cursor = graph.path_head(vid);
        while cursor != PATH_NULL {
            let at = self.decode_at(cursor);
            if self.matches(&at, record) {
                return Some(cursor);
            }
            cursor = at.prev;
        }
        None
    }

    /// Write `record` into a freshly-reserved arena slot and CAS it onto the
    /// front of `vid`'s list, retrying with an up-to-date `prev` on
    /// contention, then re-walk the list for a late-arriving duplicate.
    fn append(&self, graph: &GraphCore, vid: VertexId, record: PathRecord) -> Result<u64> {
        let n = record.encoded_len();
        let offset = self.reserve(n)?;
        let slot = self.arena_mut_slice(offset, n);

        let mut observed_head = graph.path_head(vid);
        record.encode_into(slot, observed_head)?;

        loop {
            match graph.cas_path_head(vid, observed_head, offset) {
                Ok(_) => break,
                Err(actual_head) => {
                    observed_head = actual_head;
                    slot[0..8].copy_from_slice(&observed_head.to_le_bytes());
                }
            }
        }

        if let Some(old_head) = self.late_duplicate_between(graph, vid, observed_head, &record, offset) {
            self.or_colset_at(old_head, &record.colset);
        }

        if let Some(hash) = &self.path_hash {
            let key = (vid, record.len, record.orientation, record.seq_bases.clone());
            hash.lock().entry(key).or_insert(offset);
        }

        Ok(offset)
    }

    /// After linking our record in, walk from the list's current head down
    /// to (but not including) `our_prev` looking for a record that raced us
    /// in and duplicates `record`. If found, its colset absorbs ours; our
    /// own record is left in the arena unused (wasted space, no corruption).
    fn late_duplicate_between(
        &self,
        graph: &GraphCore,
        vid: VertexId,
        our_prev: u64,
        record: &PathRecord,
        our_offset: u64,
    ) -> Option<u64> {
        let mut cursor = graph.path_head(vid);
        while cursor != PATH_NULL && cursor != our_offset {
            let at = self.decode_at(cursor);
            if cursor != our_offset && self.matches(&at, record) {
                return Some(cursor);
            }
            if cursor == our_prev {
                break;
            }
            cursor = at.prev;
        }
        None
    }

    pub fn record_count_from(&self, graph: &GraphCore, vid: VertexId) -> usize {
        let mut cursor = graph.path_head(vid);
        let mut count = 0;
        while cursor != PATH_NULL {
            count += 1;
            cursor = self.decode_at(cursor).prev;
        }
        count
    }

    pub fn colset_at(&self, offset: u64) -> Vec<u8> {
        self.decode_at(offset).colset.to_vec()
    }

    /// Decode every record in arena order, oldest-written first. Used by
    /// collaborator writers (see `formats::path`) to serialize the store;
    /// the core itself only ever walks per-vertex lists via `path_head`.
    pub fn iter_arena(&self) -> Vec<ArenaRecord> {
        let mut out = Vec::new();
        let mut off = 0u64;
        let next = self.next.load(Ordering::Acquire);
        while off < next {
            let at = self.decode_at(off);
            let seq_len = (at.len as usize * 2).div_ceil(8);
            out.push(ArenaRecord {
                offset: off,
                prev: at.prev,
                colset: at.colset.to_vec(),
                seq_bases: at.seq_bases.to_vec(),
                len: at.len,
                orientation: at.orientation,
            });
            off += (8 + self.n_colour_bytes + 2 + seq_len) as u64;
        }
        out
    }

    /// Walk the whole arena by record size and assert it lands exactly on
    /// `next`; a mismatch means a record was written with the wrong length
    /// or the cursor was advanced without a matching write.
    #[cfg(debug_assertions)]
    pub fn integrity_check(&self) {
        let mut off = 0u64;
        let next = self.next.load(Ordering::Acquire);
        while off < next {
            let at = self.decode_at(off);
            let seq_len = (at.len as usize * 2).div_ceil(8);
            off += (8 + self.n_colour_bytes + 2 + seq_len) as u64;
        }
        assert_eq!(
            off, next,
            "path store arena walk landed at {off}, expected next={next}"
        );
    }

    /// Allocate a scratch store for an offline merge pass: paths loaded from
    /// one source are staged here, against `tmp_graph`'s own path-list
    /// heads, before being folded into a main store via `merge_from`.
    pub fn setup_tmp(mem_bytes: usize, n_colours: usize) -> PathStore {
        PathStore::new(mem_bytes, n_colours, false)
    }

    /// Release a scratch store created by `setup_tmp`. The arena is dropped
    /// immediately rather than lingering for the rest of the merge.
    pub fn release_tmp(tmp: PathStore) {
        drop(tmp);
    }

    /// Fold every path record staged in `tmp` (whose lists are threaded
    /// through `tmp_graph`'s `path_head` array) into `self`/`graph`. `graph`
    /// and `tmp_graph` must share the same vertex numbering — the intended
    /// use is merging paths staged against a scratch copy of the same
    /// k-mer set back into the main graph/store pair.
    pub fn merge_from(
        &self,
        graph: &GraphCore,
        tmp: &PathStore,
        tmp_graph: &GraphCore,
        mode: WriteMode,
    ) -> Result<()> {
        let n_vertices = graph.capacity().min(tmp_graph.capacity());
        for vid in 0..n_vertices {
            let mut cursor = tmp_graph.path_head(vid);
            while cursor != PATH_NULL {
                let at = tmp.decode_at(cursor);
                let record = PathRecord {
                    colset: at.colset.to_vec(),
                    seq_bases: at.seq_bases.to_vec(),
                    len: at.len,
                    orientation: at.orientation,
                };
                cursor = at.prev;
                self.find_or_add(graph, vid, record, mode)?;
            }
        }
        Ok(())
    }
}

// SAFETY: all shared mutation goes through `reserve`'s CAS (disjoint byte
// ranges per writer) or `or_colset_at`'s atomic byte OR; no two writers ever
// touch the same byte range without an atomic in between.
unsafe impl Sync for PathStore {}
