//! Illustrative binary writers for the graph and path formats described in
//! the external-interface surface: a short header, a body written from the
//! core's own iteration methods, and a trailing CRC-64 footer over
//! everything written before it. These exist to show that
//! `GraphConsumer`/`PathStore::iter_arena` are enough for a collaborator to
//! serialize the finished state; `read_graph_header` is the minimal reverse
//! direction the CLI needs to probe an existing graph file's dimensions
//! before extending it.

use std::io::{self, Read, Write};

use chrono::Utc;
use crc::{Crc, CRC_64_GO_ISO};

use crate::kmer::Base;
use crate::pathstore::{pack_len_and_orient, PathStore};
use crate::source::GraphConsumer;

const GRAPH_MAGIC: [u8; 4] = *b"CTXG";
const GRAPH_VERSION: u32 = 1;
const PATH_MAGIC: [u8; 4] = *b"CTXP";
const PATH_VERSION: u32 = 1;

const CHECKSUM: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

fn edge_byte(outgoing: &[Base], incoming: &[Base]) -> u8 {
    let mut byte = 0u8;
    for &b in outgoing {
        byte |= 1 << (b as u8);
    }
    for &b in incoming {
        byte |= 1 << (4 + b as u8);
    }
    byte
}

/// Write `graph` as: magic/version/k/num_colours/capacity/timestamp header,
/// then one record per occupied vertex (kmer length + ascii kmer +
/// per-colour presence-and-edge byte), then an 8-byte CRC-64 footer over
/// everything written before it.
pub fn write_graph<W: Write>(writer: &mut W, graph: &dyn GraphConsumer, k: usize) -> io::Result<()> {
    let mut digest = CHECKSUM.digest();

    let mut header = Vec::with_capacity(32);
    header.extend_from_slice(&GRAPH_MAGIC);
    header.extend_from_slice(&GRAPH_VERSION.to_le_bytes());
    header.extend_from_slice(&(k as u32).to_le_bytes());
    header.extend_from_slice(&(graph.num_colours() as u32).to_le_bytes());
    header.extend_from_slice(&(graph.capacity() as u64).to_le_bytes());
    header.extend_from_slice(&Utc::now().timestamp().to_le_bytes());
    digest.update(&header);
    writer.write_all(&header)?;

    for vid in 0..graph.capacity() {
        let Some(kmer_ascii) = graph.vertex_kmer_ascii(vid) else {
            continue;
        };
        let mut rec = Vec::with_capacity(2 + kmer_ascii.len() + graph.num_colours());
        rec.extend_from_slice(&(kmer_ascii.len() as u16).to_le_bytes());
        rec.extend_from_slice(&kmer_ascii);
        for colour in 0..graph.num_colours() {
            if !graph.colour_present(colour, vid) {
                rec.push(0);
                continue;
            }
            let out = graph.outgoing_bases(colour, vid);
            let inc = graph.incoming_bases(colour, vid);
            rec.push(edge_byte(&out, &inc) | 0x80); // high bit: colour present
        }
        digest.update(&rec);
        writer.write_all(&rec)?;
    }

    writer.write_all(&digest.finalize().to_le_bytes())?;
    Ok(())
}

/// Write `store` as: magic/version/k/num_colours/num_paths header, then the
/// arena's records in write order (prev offset, colset, len, packed seq),
/// then an 8-byte CRC-64 footer.
pub fn write_paths<W: Write>(writer: &mut W, store: &PathStore, k: usize, num_colours: usize) -> io::Result<()> {
    let mut digest = CHECKSUM.digest();
    let records = store.iter_arena();

    let mut header = Vec::with_capacity(20);
    header.extend_from_slice(&PATH_MAGIC);
    header.extend_from_slice(&PATH_VERSION.to_le_bytes());
    header.extend_from_slice(&(k as u32).to_le_bytes());
    header.extend_from_slice(&(num_colours as u32).to_le_bytes());
    header.extend_from_slice(&(records.len() as u64).to_le_bytes());
    digest.update(&header);
    writer.write_all(&header)?;

    for record in &records {
        let packed = pack_len_and_orient(record.len, record.orientation)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut rec = Vec::with_capacity(8 + record.colset.len() + 2 + record.seq_bases.len());
        rec.extend_from_slice(&record.prev.to_le_bytes());
        rec.extend_from_slice(&record.colset);
        rec.extend_from_slice(&packed.to_le_bytes());
        rec.extend_from_slice(&record.seq_bases);
        digest.update(&rec);
        writer.write_all(&rec)?;
    }

    writer.write_all(&digest.finalize().to_le_bytes())?;
    Ok(())
}

/// Probed dimensions of an existing graph file, recovered from its header
/// the way `ctx_thread`'s `binary_probe` recovers `kmer_size`/`num_of_cols`
/// at startup instead of requiring them on the command line.
pub struct GraphHeader {
    pub k: u32,
    pub num_colours: u32,
    pub capacity: u64,
    pub written_at: i64,
}

pub fn read_graph_header<R: Read>(reader: &mut R) -> io::Result<GraphHeader> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != GRAPH_MAGIC {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad graph magic"));
    }
    let mut rest = [0u8; 28];
    reader.read_exact(&mut rest)?;
    let _version = u32::from_le_bytes(rest[0..4].try_into().unwrap());
    let k = u32::from_le_bytes(rest[4..8].try_into().unwrap());
    let num_colours = u32::from_le_bytes(rest[8..12].try_into().unwrap());
    let capacity = u64::from_le_bytes(rest[12..20].try_into().unwrap());
    let written_at = i64::from_le_bytes(rest[20..28].try_into().unwrap());
    Ok(GraphHeader { k, num_colours, capacity, written_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphCore;
    use crate::kmer::{Kmer, Orientation};
    use crate::pathstore::{PathRecord, WriteMode};

    #[test]
    fn write_graph_header_has_expected_magic_and_k() {
        let graph = GraphCore::new(16, 1);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        graph.find_or_add_vertex(&km, 0).unwrap();

        let mut buf = Vec::new();
        write_graph(&mut buf, &graph, 5).unwrap();

        assert_eq!(&buf[0..4], b"CTXG");
        assert_eq!(u32::from_le_bytes(buf[8..12].try_into().unwrap()), 5);
        assert!(buf.len() > 32 + 8);
    }

    #[test]
    fn read_graph_header_round_trips_write_graph() {
        let graph = GraphCore::new(16, 2);
        let mut buf = Vec::new();
        write_graph(&mut buf, &graph, 5).unwrap();

        let header = read_graph_header(&mut buf.as_slice()).unwrap();
        assert_eq!(header.k, 5);
        assert_eq!(header.num_colours, 2);
        assert_eq!(header.capacity, 16);
        assert!(header.written_at > 0);
    }

    #[test]
    fn write_paths_header_counts_records() {
        let graph = GraphCore::new(16, 1);
        let store = PathStore::new(4096, 1, false);
        let km = Kmer::from_ascii(b"ACGTA", 5).unwrap();
        let (vid, _) = graph.find_or_add_vertex(&km, 0).unwrap();
        store
            .find_or_add(
                &graph,
                vid,
                PathRecord { colset: vec![1], seq_bases: vec![0xAA], len: 4, orientation: Orientation::Forward },
                WriteMode::InsertOnly,
            )
            .unwrap();

        let mut buf = Vec::new();
        write_paths(&mut buf, &store, 5, 1).unwrap();

        assert_eq!(&buf[0..4], b"CTXP");
        let num_paths = u64::from_le_bytes(buf[12..20].try_into().unwrap());
        assert_eq!(num_paths, 1);
    }
}
