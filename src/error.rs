//! Library-level error type.
//!
//! Typed errors (`thiserror`) are used here, in the core modules; the CLI
//! boundary (`main.rs`) wraps these in `anyhow::Result` and turns a fatal
//! error into a one-line stderr diagnostic plus non-zero exit code.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CortexError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt input format: {0}")]
    Format(String),

    #[error("out of memory: {0}")]
    OutOfMemory(String),

    #[error("corrupt internal state: {0}")]
    CorruptState(String),

    #[error("threading error: {0}")]
    Threading(String),
}

pub type Result<T> = std::result::Result<T, CortexError>;
