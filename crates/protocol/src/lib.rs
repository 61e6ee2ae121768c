//! Wire types for the Metadata File Service upload protocol.
//!
//! Everything here is transport-agnostic: JSON payloads, resource paths,
//! and the header encodings the service expects.

pub mod constants;
pub mod headers;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::ErrorCode;
pub use messages::{CommitRequest, ErrorEnvelope, FileDetail};
pub use types::{FilePart, UploadSession};
