//! Console reporting of transfer events.

use fileservice_client::FileServiceEvent;
use tracing::{debug, error, info, warn};

/// Logs one event as a single line.
pub fn log_event(event: &FileServiceEvent) {
    let line = describe(event);
    match event {
        FileServiceEvent::Navigating { .. } | FileServiceEvent::Navigated { .. } => {
            debug!("{line}")
        }
        FileServiceEvent::TransientError { .. } => warn!("{line}"),
        FileServiceEvent::UploadError { .. } => error!("{line}"),
        _ => info!("{line}"),
    }
}

/// Renders an event for humans.
pub fn describe(event: &FileServiceEvent) -> String {
    match event {
        FileServiceEvent::Navigating { method, url, .. } => format!("{method} {url}"),
        FileServiceEvent::Navigated {
            method,
            url,
            status,
            ..
        } => match status {
            Some(status) => format!("{method} {url} -> {status}"),
            None => format!("{method} {url} -> no response"),
        },
        FileServiceEvent::TransientError {
            method,
            url,
            status,
            retry,
            max_retries,
            ..
        } => format!(
            "{method} {url} failed ({}), retry {retry}/{max_retries}",
            status.map_or_else(|| "network error".to_string(), |s| s.to_string())
        ),
        FileServiceEvent::AccessTokenRequested { .. } => "requesting access token".into(),
        FileServiceEvent::NewAccessTokenRequested { .. } => {
            "access token rejected, requesting a new one".into()
        }
        FileServiceEvent::FileChecked {
            found,
            hash_matched,
            server_file_name,
            ..
        } => match (found, hash_matched) {
            (false, _) => "no file stored yet".into(),
            (true, true) => "stored file is identical".into(),
            (true, false) => format!(
                "stored file {} differs",
                server_file_name.as_deref().unwrap_or("(unnamed)")
            ),
        },
        FileServiceEvent::CalculatingHash { path, size, .. } => {
            format!("hashing {} ({size} bytes)", path.display())
        }
        FileServiceEvent::SessionCreated {
            session_id,
            chunk_size_bytes,
            expiration_minutes,
            ..
        } => format!(
            "session {session_id} opened: {chunk_size_bytes} byte parts, expires in {expiration_minutes} min"
        ),
        FileServiceEvent::FileUploadStarted {
            file_name,
            part_count,
            ..
        } => format!("uploading {file_name} in {part_count} parts"),
        FileServiceEvent::PartUploaded {
            parts_uploaded,
            part_count,
            estimated_remaining,
            ..
        } => match estimated_remaining {
            Some(eta) => format!(
                "part {parts_uploaded}/{part_count} uploaded, about {}s left",
                eta.as_secs()
            ),
            None => format!("part {parts_uploaded}/{part_count} uploaded"),
        },
        FileServiceEvent::Committing {
            file_name, parts, ..
        } => format!("committing {file_name} ({} parts)", parts.len()),
        FileServiceEvent::CheckingCommit { attempt, .. } => {
            format!("waiting for commit, check {attempt}")
        }
        FileServiceEvent::FileUploadCompleted {
            file_name,
            file_hash,
            ..
        } => format!(
            "{file_name} uploaded (md5 {})",
            file_hash.as_deref().unwrap_or("unknown")
        ),
        FileServiceEvent::FileDownloaded { path, size, .. } => {
            format!("downloaded {} ({size} bytes)", path.display())
        }
        FileServiceEvent::UploadError {
            url, status, body, ..
        } => match (url, status) {
            (Some(url), Some(status)) => format!("{url} returned {status}: {body}"),
            _ => body.clone(),
        },
    }
}
