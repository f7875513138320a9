//! Concurrent colored de Bruijn graph construction and read-thread
//! ingestion: k-mer encoding, a bucketed concurrent hash table, the graph
//! itself, a path-record arena, and the worker pools that drive both the
//! initial build and the later path-threading pass.

pub mod bitset;
pub mod cli;
pub mod error;
pub mod fatal;
pub mod formats;
pub mod graph;
pub mod hashtable;
pub mod kmer;
pub mod msgpool;
pub mod pathstore;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod threader;

pub use error::{CortexError, Result};
pub use graph::GraphCore;
pub use hashtable::{BucketedHashTable, VertexId};
pub use kmer::{Base, Kmer, Orientation};
pub use pathstore::{PathRecord, PathStore, WriteMode};
pub use pipeline::{DuplicateMode, IngestPipeline};
pub use stats::{Stats, StatsSnapshot};
pub use threader::PathThreader;
