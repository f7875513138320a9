//! Process-wide abort path for unrecoverable errors; partial state is
//! discarded rather than reported back through a `Result`.
//!
//! Worker threads never unwind a panic across the pipeline's
//! `std::thread::scope` boundary — a fatal `CortexError` is logged and the
//! whole process exits immediately instead.

/// Log `err` at the given subsystem, print the required one-line stderr
/// diagnostic, and exit the process with a non-zero status.
pub fn die(subsystem: &str, err: &crate::error::CortexError) -> ! {
    tracing::error!(subsystem, error = %err, "fatal error");
    eprintln!("ctx-thread: [{subsystem}] fatal: {err}");
    std::process::exit(1);
}
