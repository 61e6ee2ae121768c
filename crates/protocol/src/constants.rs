use std::fmt;

use uuid::Uuid;

/// Structured error codes carried in `ErrorCode` of 400 responses.
///
/// The service serializes these either by name or by their numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    None,
    SessionAlreadyExists,
}

impl ErrorCode {
    /// Returns the wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::SessionAlreadyExists => "SessionAlreadyExists",
        }
    }

    /// Parses a wire name (case-insensitive). Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::None, Self::SessionAlreadyExists]
            .into_iter()
            .find(|code| code.as_str().eq_ignore_ascii_case(name))
    }

    /// Maps the numeric form used by the service's enum serialization.
    pub fn from_number(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::SessionAlreadyExists),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resource paths (relative to the service base URL)
// ---------------------------------------------------------------------------

/// `Files({resourceId})`: existence check, download.
pub fn file_path(resource_id: u32) -> String {
    format!("Files({resource_id})")
}

/// `Files({resourceId})/UploadSessions`: create and delete sessions.
pub fn upload_sessions_path(resource_id: u32) -> String {
    format!("Files({resource_id})/UploadSessions")
}

/// `Files({resourceId})/UploadSessions({sessionId})`: part upload, commit status.
pub fn upload_session_path(resource_id: u32, session_id: Uuid) -> String {
    format!("Files({resource_id})/UploadSessions({session_id})")
}

/// `Files({resourceId})/UploadSessions({sessionId})/MetadataService.Commit`.
pub fn commit_path(resource_id: u32, session_id: Uuid) -> String {
    format!("Files({resource_id})/UploadSessions({session_id})/MetadataService.Commit")
}

/// `Files({resourceId})/MetadataService.SetUploaded`: marks an already
/// stored file as uploaded without transferring it again.
pub fn set_uploaded_path(resource_id: u32) -> String {
    format!("Files({resource_id})/MetadataService.SetUploaded")
}

// ---------------------------------------------------------------------------
// Header names and media types
// ---------------------------------------------------------------------------

pub const HEADER_CONTENT_MD5: &str = "content-md5";
pub const HEADER_CONTENT_DISPOSITION: &str = "content-disposition";
pub const HEADER_CONTENT_RANGE: &str = "content-range";
pub const HEADER_LAST_MODIFIED: &str = "last-modified";

pub const MEDIA_TYPE_JSON: &str = "application/json";
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";
