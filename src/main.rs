//! `ctx-thread`: load an existing graph, build it further from the given
//! single- and paired-end read lists, then thread read paths through it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use cortex_graph::cli::{read_list_file, Cli};
use cortex_graph::formats::read_graph_header;
use cortex_graph::graph::GraphCore;
use cortex_graph::pathstore::{PathStore, WriteMode};
use cortex_graph::pipeline::{DuplicateMode, IngestPipeline};
use cortex_graph::source::{BuildTask, ReadBatch, ReadRecord, SequenceSource};
use cortex_graph::stats::Stats;
use cortex_graph::threader::{PathThreader, ThreadBatch, ThreadSource};

const DEFAULT_QUALITY_CUTOFF: u8 = 0;
const DEFAULT_HOMOPOLYMER_CUTOFF: usize = 100;
/// Fraction of the memory budget given to the hash table vs. the path arena.
const GRAPH_MEM_FRACTION: f64 = 0.6;
const BYTES_PER_HASH_SLOT: u64 = 64;

/// Minimal read decoder standing in for a real FASTQ/SAM reader: one read
/// sequence per line, quality scores assumed uniformly high. Single-file
/// form feeds `--se_list`; the paired form zips two files line by line for
/// `--pe_list`.
struct LineReadSource {
    lines1: std::io::Lines<BufReader<File>>,
    lines2: Option<std::io::Lines<BufReader<File>>>,
    task: Arc<BuildTask>,
}

impl LineReadSource {
    fn single(path: &Path, task: Arc<BuildTask>) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Self { lines1: BufReader::new(file).lines(), lines2: None, task })
    }

    fn paired(path1: &Path, path2: &Path, task: Arc<BuildTask>) -> Result<Self> {
        let f1 = File::open(path1).with_context(|| format!("opening {}", path1.display()))?;
        let f2 = File::open(path2).with_context(|| format!("opening {}", path2.display()))?;
        Ok(Self {
            lines1: BufReader::new(f1).lines(),
            lines2: Some(BufReader::new(f2).lines()),
            task,
        })
    }
}

fn line_to_read(line: String) -> ReadRecord {
    ReadRecord { qual: vec![b'I'; line.len()], seq: line.into_bytes() }
}

impl SequenceSource for LineReadSource {
    fn next_batch(&mut self) -> Option<ReadBatch> {
        let r1 = line_to_read(self.lines1.next()?.ok()?);
        let r2 = match &mut self.lines2 {
            Some(lines2) => Some(line_to_read(lines2.next()?.ok()?)),
            None => None,
        };
        Some(ReadBatch {
            r1,
            r2,
            fq_offset1: 33,
            fq_offset2: 33,
            sam_dup1: false,
            sam_dup2: false,
            task: self.task.clone(),
        })
    }
}

/// Threading re-reads each file independently (paired mates thread as two
/// separate single-end passes, matching "re-reads each input file").
struct ThreadLineSource {
    lines: std::io::Lines<BufReader<File>>,
    colour: usize,
}

impl ThreadLineSource {
    fn new(path: &Path, colour: usize) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        Ok(Self { lines: BufReader::new(file).lines(), colour })
    }
}

impl ThreadSource for ThreadLineSource {
    fn next_read(&mut self) -> Option<ThreadBatch> {
        let read = line_to_read(self.lines.next()?.ok()?);
        Some(ThreadBatch { read, colour: self.colour, write_mode: WriteMode::Dedup })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let threads = cli.effective_threads();
    let memory = cli.memory_spec().context("parsing memory spec")?;
    let se_lists = cli.se_lists().context("parsing --se_list arguments")?;
    let pe_lists = cli.pe_lists().context("parsing --pe_list arguments")?;

    let header = {
        let mut file =
            File::open(&cli.input).with_context(|| format!("opening {}", cli.input.display()))?;
        read_graph_header(&mut file).context("probing input graph header")?
    };
    tracing::info!(
        k = header.k,
        colours = header.num_colours,
        capacity = header.capacity,
        written_at = header.written_at,
        "probed input graph"
    );

    let hash_capacity = ((memory.bytes as f64 * GRAPH_MEM_FRACTION) as u64 / BYTES_PER_HASH_SLOT)
        .max(header.capacity * 2)
        .max(1024) as usize;
    let path_mem = ((memory.bytes as f64 * (1.0 - GRAPH_MEM_FRACTION)) as usize).max(4096);

    let graph = GraphCore::new(hash_capacity, header.num_colours as usize);
    let path_store = PathStore::new(path_mem, header.num_colours as usize, true);
    let stats = Arc::new(Stats::new());

    let mut ingest_files: Vec<(PathBuf, Option<PathBuf>, Arc<BuildTask>)> = Vec::new();

    for entry in &se_lists {
        let task = Arc::new(BuildTask {
            colour: entry.colour,
            quality_cutoff: DEFAULT_QUALITY_CUTOFF,
            homopolymer_cutoff: DEFAULT_HOMOPOLYMER_CUTOFF,
            duplicate_mode: DuplicateMode::RemoveDupsSe,
            stats: stats.clone(),
        });
        for path in read_list_file(&entry.list_file)? {
            ingest_files.push((path, None, task.clone()));
        }
    }

    for entry in &pe_lists {
        let task = Arc::new(BuildTask {
            colour: entry.colour,
            quality_cutoff: DEFAULT_QUALITY_CUTOFF,
            homopolymer_cutoff: DEFAULT_HOMOPOLYMER_CUTOFF,
            duplicate_mode: DuplicateMode::RemoveDupsPe,
            stats: stats.clone(),
        });
        let files1 = read_list_file(&entry.list_file1)?;
        let files2 = read_list_file(&entry.list_file2)?;
        for (p1, p2) in files1.into_iter().zip(files2) {
            ingest_files.push((p1, Some(p2), task.clone()));
        }
    }

    let mut sources: Vec<Box<dyn SequenceSource>> = Vec::new();
    for (path1, path2, task) in &ingest_files {
        let source: LineReadSource = match path2 {
            Some(p2) => LineReadSource::paired(path1, p2, task.clone())?,
            None => LineReadSource::single(path1, task.clone())?,
        };
        sources.push(Box::new(source));
    }

    let pipeline = IngestPipeline::new(header.k as usize, threads);
    pipeline.run(&graph, sources);

    let mut thread_sources: Vec<Box<dyn ThreadSource>> = Vec::new();
    for (path1, path2, task) in &ingest_files {
        thread_sources.push(Box::new(ThreadLineSource::new(path1, task.colour)?));
        if let Some(p2) = path2 {
            thread_sources.push(Box::new(ThreadLineSource::new(p2, task.colour)?));
        }
    }

    let threader = PathThreader::new(header.k as usize, threads);
    threader.run(&graph, &path_store, thread_sources);

    let snapshot = stats.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
