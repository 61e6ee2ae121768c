use std::path::{Component, Path};

use crate::TransferError;

/// Validates a server-supplied file name before it is joined to a local
/// destination folder.
///
/// Only a single plain component is accepted. Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`) and `.`
/// - Any directory separator
pub fn validate_file_name(file_name: &str) -> Result<(), TransferError> {
    if file_name.trim().is_empty() {
        return Err(TransferError::InvalidPath("empty file name".into()));
    }
    if file_name.contains(['/', '\\']) {
        return Err(TransferError::InvalidPath(format!(
            "directory separators not allowed: {file_name}"
        )));
    }

    let mut components = Path::new(file_name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir | Component::CurDir), _) => Err(TransferError::InvalidPath(
            format!("relative component not allowed: {file_name}"),
        )),
        (Some(Component::Prefix(_) | Component::RootDir), _) => Err(TransferError::InvalidPath(
            format!("absolute path not allowed: {file_name}"),
        )),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {file_name}"
        ))),
    }
}

/// Returns the file name component of a local upload source.
pub fn local_file_name(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            TransferError::InvalidPath(format!("no usable file name in {}", path.display()))
        })
}
