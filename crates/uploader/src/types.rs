//! Data types for the upload flow.

use std::path::PathBuf;
use std::time::Duration;

use fileservice_client::RemoteFileInfo;
use fileservice_protocol::UploadSession;

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UploaderConfig {
    /// Status checks made after a commit is accepted but not yet finished.
    pub commit_poll_attempts: u32,
    pub commit_poll_interval: Duration,
    /// Capacity of the progress event channel. A full channel pauses the
    /// transfer until the receiver catches up.
    pub event_capacity: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            commit_poll_attempts: 60,
            commit_poll_interval: Duration::from_secs(10),
            event_capacity: 1024,
        }
    }
}

/// Result of a successful `upload_file`.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The file was transferred and committed.
    Uploaded {
        session: UploadSession,
        file_hash: String,
        part_count: u32,
    },
    /// The service already held identical content; only marked as uploaded.
    AlreadyUploaded { file_name: String, file_hash: String },
}

impl UploadOutcome {
    /// Lowercase hex MD5 of the local file.
    pub fn file_hash(&self) -> &str {
        match self {
            Self::Uploaded { file_hash, .. } | Self::AlreadyUploaded { file_hash, .. } => file_hash,
        }
    }
}

/// Result of a successful `download_file`.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub size: u64,
    pub info: RemoteFileInfo,
}
