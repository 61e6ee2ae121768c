use std::future::Future;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use fileservice_protocol::FilePart;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::TransferError;
use crate::digest::digest_bytes;

/// Number of parts a file of `file_len` bytes splits into.
///
/// A file shorter than one chunk (including an empty one) is a single part.
/// Otherwise the count is the floating-point ceiling of `file_len / chunk_size`,
/// which is what the service checks the committed part list against.
pub fn part_count(chunk_size: u64, file_len: u64) -> u32 {
    if chunk_size == 0 || file_len < chunk_size {
        return 1;
    }
    (file_len as f64 / chunk_size as f64).ceil() as u32
}

/// Converts the service's megabyte limit to bytes.
pub fn max_file_bytes(max_file_size_megabytes: u64) -> u64 {
    max_file_size_megabytes.saturating_mul(1024 * 1024)
}

// ---------------------------------------------------------------------------
// PartReader
// ---------------------------------------------------------------------------

/// Reads a file sequentially in fixed-size parts, hashing each one.
pub struct PartReader {
    file: tokio::fs::File,
    buf: BytesMut,
    chunk_size: usize,
    offset: u64,
    next_id: u32,
    file_size: u64,
}

impl PartReader {
    /// Opens `path` for reading in parts of `chunk_size` bytes.
    pub async fn open(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::Validation("chunk size must be positive".into()));
        }
        let chunk_size = usize::try_from(chunk_size).map_err(|_| {
            TransferError::Validation(format!("chunk size {chunk_size} does not fit in memory"))
        })?;

        let file = tokio::fs::File::open(path).await?;
        let file_size = file.metadata().await?.len();
        Ok(Self {
            file,
            buf: BytesMut::with_capacity(chunk_size),
            chunk_size,
            offset: 0,
            next_id: 0,
            file_size,
        })
    }

    /// Reads the next part. Returns `None` at EOF.
    ///
    /// Only the final part may be shorter than the chunk size.
    pub async fn next_part(&mut self) -> Result<Option<(Bytes, FilePart)>, TransferError> {
        self.buf.clear();
        self.buf.resize(self.chunk_size, 0);

        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.file.read(&mut self.buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.buf.truncate(filled);
        if filled == 0 {
            return Ok(None);
        }

        let data = self.buf.split().freeze();
        let part = FilePart {
            id: self.next_id,
            hash: digest_bytes(&data),
            size: filled as u64,
            offset: self.offset,
        };
        self.next_id += 1;
        self.offset += filled as u64;
        Ok(Some((data, part)))
    }

    /// Size of the file when it was opened.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

// ---------------------------------------------------------------------------
// split
// ---------------------------------------------------------------------------

/// Streams `path` part by part, awaiting `on_part` for each before reading the
/// next one, and returns the ordered part list.
///
/// Fails without reading any content when the file exceeds the limit.
pub async fn split<F, Fut, E>(
    path: &Path,
    chunk_size: u64,
    max_file_size_megabytes: u64,
    mut on_part: F,
) -> Result<Vec<FilePart>, E>
where
    F: FnMut(Bytes, FilePart) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<TransferError>,
{
    if path.as_os_str().is_empty() {
        return Err(TransferError::Validation("file path is empty".into()).into());
    }
    if chunk_size == 0 {
        return Err(TransferError::Validation("chunk size must be positive".into()).into());
    }
    if max_file_size_megabytes == 0 {
        return Err(TransferError::Validation("max file size must be positive".into()).into());
    }

    let mut reader = PartReader::open(path, chunk_size).await?;
    let max_bytes = max_file_bytes(max_file_size_megabytes);
    if reader.file_size() > max_bytes {
        return Err(TransferError::FileTooLarge {
            size: reader.file_size(),
            max_bytes,
        }
        .into());
    }

    debug!(
        path = %path.display(),
        size = reader.file_size(),
        chunk_size,
        parts = part_count(chunk_size, reader.file_size()),
        "splitting file"
    );

    let mut parts = Vec::new();
    while let Some((data, part)) = reader.next_part().await? {
        on_part(data, part.clone()).await?;
        parts.push(part);
    }
    Ok(parts)
}
