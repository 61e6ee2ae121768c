use std::time::Duration;

use chrono::{DateTime, Utc};
use fileservice_protocol::UploadSession;

use crate::error::ApiFailure;
use crate::retry::RetryConfig;
use crate::transport::ResponseBody;

/// Default overall timeout per HTTP exchange; large parts need minutes.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_BASE_URL: &str = "http://localhost/MetadataService/v2/";

/// Client construction parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

/// Metadata the service reports for a stored file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFileInfo {
    pub last_modified: Option<DateTime<Utc>>,
    /// Lowercase hex digest decoded from `Content-MD5`.
    pub hash: Option<String>,
    pub file_name: Option<String>,
}

/// Outcome of the existence probe.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckFileResult {
    Found(RemoteFileInfo),
    NotFound,
}

/// Outcome of a commit or commit-status call.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Committed(UploadSession),
    /// Accepted; the service is still assembling the file.
    Pending,
    Failed(ApiFailure),
}

/// A file being downloaded: its metadata and the unread body.
#[derive(Debug)]
pub struct Download {
    pub info: RemoteFileInfo,
    pub body: ResponseBody,
}
