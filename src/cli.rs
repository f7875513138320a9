//! `ctx-thread` command-line surface: positional thread count, memory
//! budget, and input graph, plus repeatable `--se_list`/`--pe_list` flags
//! for single- and paired-end input files.

use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use crate::error::CortexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySpec {
    pub bytes: u64,
}

impl FromStr for MemorySpec {
    type Err = CortexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CortexError::InvalidArgument(format!("invalid memory spec: {s}"));
        if s.is_empty() {
            return Err(invalid());
        }
        let (digits, multiplier) = match s.as_bytes()[s.len() - 1] {
            b'K' | b'k' => (&s[..s.len() - 1], 1024u64),
            b'M' | b'm' => (&s[..s.len() - 1], 1024 * 1024),
            b'G' | b'g' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
            b'T' | b't' => (&s[..s.len() - 1], 1024 * 1024 * 1024 * 1024),
            _ => (s, 1),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        Ok(MemorySpec {
            bytes: value.checked_mul(multiplier).ok_or_else(invalid)?,
        })
    }
}

/// A parsed `--se_list <colour> <list-file>` or `--pe_list <colour>
/// <list-file1> <list-file2>` occurrence, after colour/file splitting.
#[derive(Debug, Clone)]
pub struct SeList {
    pub colour: usize,
    pub list_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PeList {
    pub colour: usize,
    pub list_file1: PathBuf,
    pub list_file2: PathBuf,
}

#[derive(Parser, Debug)]
#[command(name = "ctx-thread", about = "Build a colored de Bruijn graph and thread read paths through it")]
pub struct Cli {
    /// Number of builder worker threads; 0 means "use the detected core count".
    pub threads: usize,

    /// Memory budget, e.g. "2G", "512M"; suffixes K/M/G/T are base 1024.
    pub memory: String,

    /// Input graph file to load and extend (kmer size, colours, and vertex
    /// count are probed from this file at startup).
    pub input: PathBuf,

    /// `--se_list <colour> <list-file>`, repeatable; each list file holds
    /// one input path per line.
    #[arg(long = "se_list", num_args = 2, value_names = ["COLOUR", "LIST_FILE"])]
    pub se_list: Vec<String>,

    /// `--pe_list <colour> <list-file1> <list-file2>`, repeatable.
    #[arg(long = "pe_list", num_args = 3, value_names = ["COLOUR", "LIST_FILE1", "LIST_FILE2"])]
    pub pe_list: Vec<String>,
}

impl Cli {
    /// Resolves `threads`, substituting the detected core count when the
    /// caller asked for `0`.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    pub fn memory_spec(&self) -> Result<MemorySpec, CortexError> {
        self.memory.parse()
    }

    pub fn se_lists(&self) -> Result<Vec<SeList>, CortexError> {
        self.se_list
            .chunks(2)
            .map(|chunk| {
                let colour = chunk[0]
                    .parse()
                    .map_err(|_| CortexError::InvalidArgument(format!("bad colour: {}", chunk[0])))?;
                Ok(SeList { colour, list_file: PathBuf::from(&chunk[1]) })
            })
            .collect()
    }

    pub fn pe_lists(&self) -> Result<Vec<PeList>, CortexError> {
        self.pe_list
            .chunks(3)
            .map(|chunk| {
                let colour = chunk[0]
                    .parse()
                    .map_err(|_| CortexError::InvalidArgument(format!("bad colour: {}", chunk[0])))?;
                Ok(PeList {
                    colour,
                    list_file1: PathBuf::from(&chunk[1]),
                    list_file2: PathBuf::from(&chunk[2]),
                })
            })
            .collect()
    }
}

/// Read a `.falist`-style list file: one input path per line, blank lines
/// and lines starting with `#` ignored.
pub fn read_list_file(path: &std::path::Path) -> Result<Vec<PathBuf>, CortexError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CortexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_spec_parses_suffixes() {
        assert_eq!("500".parse::<MemorySpec>().unwrap().bytes, 500);
        assert_eq!("2K".parse::<MemorySpec>().unwrap().bytes, 2048);
        assert_eq!("1M".parse::<MemorySpec>().unwrap().bytes, 1024 * 1024);
        assert_eq!("1G".parse::<MemorySpec>().unwrap().bytes, 1024 * 1024 * 1024);
    }

    #[test]
    fn memory_spec_rejects_garbage() {
        assert!("abc".parse::<MemorySpec>().is_err());
        assert!("".parse::<MemorySpec>().is_err());
    }

    #[test]
    fn effective_threads_substitutes_core_count_for_zero() {
        let mut cli = Cli {
            threads: 4,
            memory: "1G".into(),
            input: PathBuf::from("in.ctx"),
            se_list: vec![],
            pe_list: vec![],
        };
        assert_eq!(cli.effective_threads(), 4);
        cli.threads = 0;
        assert!(cli.effective_threads() >= 1);
    }

    #[test]
    fn read_list_file_skips_blanks_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.falist");
        std::fs::write(&path, "# comment\n\nreads/a.fq\nreads/b.fq\n").unwrap();

        let files = read_list_file(&path).unwrap();
        assert_eq!(files, vec![PathBuf::from("reads/a.fq"), PathBuf::from("reads/b.fq")]);
    }

    #[test]
    fn se_lists_chunks_colour_and_path() {
        let cli = Cli {
            threads: 1,
            memory: "1G".into(),
            input: PathBuf::from("in.ctx"),
            se_list: vec!["0".into(), "reads.falist".into()],
            pe_list: vec![],
        };
        let parsed = cli.se_lists().unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].colour, 0);
        assert_eq!(parsed[0].list_file, PathBuf::from("reads.falist"));
    }
}
