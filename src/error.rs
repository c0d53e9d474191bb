//! Crate-wide error type.

use thiserror::Error;

/// Result alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong when hashing, encoding, or verifying.
#[derive(Debug, Error)]
pub enum Error {
    /// A chaining value computed from received bytes did not match the
    /// value expected from its parent (or the root hash).
    #[error("verification failed")]
    VerificationFailed,

    /// The encoded stream, slice, or outboard data could not be parsed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A requested byte range or group index does not exist in the content.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A partial receiver was finalized before all groups were present.
    #[error("incomplete: have {have} of {total} groups")]
    Incomplete { have: u64, total: u64 },

    /// A configuration value (XOF length, chunk group log, worker count) was
    /// out of the supported range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Propagated from a caller-supplied `Read`/`Write` adapter.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
