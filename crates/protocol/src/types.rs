use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contiguous byte range of a source file.
///
/// Serialized exactly as the commit payload expects (`Id`, `Hash`, `Size`,
/// `Offset`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FilePart {
    /// Zero-based ordinal within the split.
    pub id: u32,
    /// Lowercase hex MD5 of the part's bytes.
    pub hash: String,
    /// Byte length of the part.
    pub size: u64,
    /// Byte offset within the source file.
    pub offset: u64,
}

impl FilePart {
    /// Offset of the first byte after this part.
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Server-side correlation context for one upload attempt.
///
/// Returned by session creation, commit, commit polling, and session
/// deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    #[serde(rename = "SessionId")]
    pub session_id: Uuid,
    #[serde(rename = "FileUploadChunkSizeInBytes", default)]
    pub chunk_size_bytes: u64,
    #[serde(rename = "FileUploadMaxFileSizeInMegabytes", default)]
    pub max_file_size_megabytes: u64,
    #[serde(
        rename = "SessionStartedBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub started_by: Option<String>,
    #[serde(
        rename = "SessionStartedDateTimeUtc",
        default,
        with = "utc_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at_utc: Option<DateTime<Utc>>,
    #[serde(
        rename = "SessionFinishedDateTimeUtc",
        default,
        with = "utc_datetime",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at_utc: Option<DateTime<Utc>>,
    #[serde(rename = "FileHash", default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
    #[serde(rename = "FileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "FileUploadSessionExpirationInMinutes", default)]
    pub expiration_minutes: u64,
}

/// Timestamps from the service may carry an offset (`2018-10-20T12:00:00Z`)
/// or be naive (`2018-10-20T12:00:00.123`); naive values are UTC.
mod utc_datetime {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}
