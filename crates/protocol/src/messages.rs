use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::ErrorCode;
use crate::types::FilePart;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Body of `POST .../MetadataService.Commit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommitRequest {
    pub file_detail: FileDetail,
}

/// Whole-file description submitted at commit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileDetail {
    pub file_name: String,
    pub hash: String,
    pub size: u64,
    pub parts: Vec<FilePart>,
}

impl CommitRequest {
    pub fn new(file_name: &str, hash: &str, size: u64, parts: &[FilePart]) -> Self {
        Self {
            file_detail: FileDetail {
                file_name: file_name.to_string(),
                hash: hash.to_string(),
                size,
                parts: parts.to_vec(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

/// Structured error body returned with 400 responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(
        rename = "ErrorCode",
        default,
        deserialize_with = "deserialize_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub code: Option<String>,
    #[serde(rename = "Message", default)]
    pub message: String,
}

impl ErrorEnvelope {
    /// Decodes an error body. Returns `None` for non-JSON bodies.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    /// Returns the typed error code, if it is one this client knows.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.code.as_deref().and_then(ErrorCode::from_name)
    }
}

/// Accepts `"SessionAlreadyExists"`, `1`, or `null`.
fn deserialize_code<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawCode {
        Name(String),
        Number(i64),
    }

    Ok(match Option::<RawCode>::deserialize(deserializer)? {
        None => None,
        Some(RawCode::Name(name)) => Some(name),
        Some(RawCode::Number(n)) => Some(
            ErrorCode::from_number(n)
                .map(|code| code.as_str().to_string())
                .unwrap_or_else(|| n.to_string()),
        ),
    })
}
