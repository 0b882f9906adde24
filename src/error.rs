//! Error types for the engine.
//!
//! Every error here is recovered locally: open and decode failures make the
//! player skip to the next queued entry, never surface to callers.

use thiserror::Error;

/// Engine error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying file I/O failure.
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation on a stream that is not open.
    #[error("stream is not open")]
    StreamClosed,

    /// Container structure did not parse (missing chunks, bad magic).
    #[error("malformed container: {0}")]
    Malformed(&'static str),

    /// Recognized container with a sub-format this decoder does not handle.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// Header sniffing and the extension fallback both failed.
    #[error("unknown codec")]
    UnknownCodec,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
