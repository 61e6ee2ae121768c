use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::TransferError;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Computes MD5 of `data` and returns the lowercase hex digest.
pub fn digest_bytes(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Computes MD5 of an entire file and returns the lowercase hex digest.
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn digest_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Whole-file digest accumulated from the buffers already read for splitting.
#[derive(Default)]
pub struct IncrementalDigest {
    state: Option<Md5>,
    finalized: bool,
}

impl IncrementalDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next buffer. Fails once the digest has been finalized.
    pub fn append(&mut self, data: &[u8]) -> Result<(), TransferError> {
        if self.finalized {
            return Err(TransferError::DigestFinalized);
        }
        self.state.get_or_insert_with(Md5::new).update(data);
        Ok(())
    }

    /// Produces the digest. Can only be called once.
    pub fn finalize(&mut self) -> Result<String, TransferError> {
        if self.finalized {
            return Err(TransferError::DigestFinalized);
        }
        self.finalized = true;
        let state = self.state.take().unwrap_or_default();
        Ok(hex::encode(state.finalize()))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn digest_bytes_known_vectors() {
        assert_eq!(digest_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(digest_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn digest_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(&path).unwrap().write_all(&data).unwrap();

        assert_eq!(digest_file(&path).unwrap(), digest_bytes(&data));
    }

    #[test]
    fn digest_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = digest_file(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }

    #[test]
    fn incremental_matches_whole() {
        let mut inc = IncrementalDigest::new();
        for chunk in [b"he".as_slice(), b"l", b"lo"] {
            inc.append(chunk).unwrap();
        }
        assert_eq!(inc.finalize().unwrap(), digest_bytes(b"hello"));
        assert!(inc.is_finalized());
    }

    #[test]
    fn incremental_with_no_input_is_empty_digest() {
        let mut inc = IncrementalDigest::new();
        assert_eq!(inc.finalize().unwrap(), digest_bytes(b""));
    }

    #[test]
    fn incremental_rejects_use_after_finalize() {
        let mut inc = IncrementalDigest::new();
        inc.append(b"x").unwrap();
        inc.finalize().unwrap();
        assert!(matches!(inc.append(b"y"), Err(TransferError::DigestFinalized)));
        assert!(matches!(inc.finalize(), Err(TransferError::DigestFinalized)));
    }
}
