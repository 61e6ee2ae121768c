//! Local side of an upload: content hashing, streaming file splitting,
//! progress estimation, and file name validation.

mod chunked;
mod digest;
mod progress;
mod validation;

pub use chunked::{PartReader, max_file_bytes, part_count, split};
pub use digest::{IncrementalDigest, digest_bytes, digest_file};
pub use progress::{EtaEstimator, estimate_remaining};
pub use validation::{local_file_name, validate_file_name};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    Validation(String),

    #[error("file is {size} bytes, larger than the allowed {max_bytes} bytes")]
    FileTooLarge { size: u64, max_bytes: u64 },

    #[error("digest already finalized")]
    DigestFinalized,

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
