//! Upload and download flows for the Metadata File Service.
//!
//! The orchestrator drives one file at a time through the session protocol:
//!
//! 1. **Check** whether the service already stores identical content
//! 2. **Session** open an upload session, replacing a stale one once
//! 3. **Parts** stream the file in session-sized parts
//! 4. **Commit** submit the part list and wait for the service to assemble it

pub mod error;
pub mod orchestrator;
pub mod types;

pub use error::UploadError;
pub use orchestrator::UploadOrchestrator;
pub use types::{DownloadOutcome, UploadOutcome, UploaderConfig};
