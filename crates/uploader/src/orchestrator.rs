//! Upload orchestrator.
//!
//! Runs the check, session, parts, and commit steps for one file, reports
//! progress on its own event channel, and supports cancellation between
//! steps and before every part.

use std::io;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use fileservice_client::{
    CheckFileResult, ClientError, CommitOutcome, Download, EventSink, FileServiceClient,
    FileServiceEvent, RemoteFileInfo, ResponseBody,
};
use fileservice_protocol::{ErrorCode, FilePart, UploadSession};
use fileservice_transfer::{
    EtaEstimator, IncrementalDigest, digest_file, local_file_name, part_count, split,
    validate_file_name,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::UploadError;
use crate::types::{DownloadOutcome, UploadOutcome, UploaderConfig};

/// What the existence check decided.
enum Precheck {
    /// Transfer the file; the whole-file digest is already known when set.
    Upload(Option<String>),
    /// The service holds identical content.
    Skip(String),
}

/// Drives uploads and downloads through a shared client.
///
/// Each orchestrator owns its event channel and cancellation token; several
/// can share one [`FileServiceClient`] and its connection pool.
///
/// Events apply backpressure: a full channel pauses the transfer until the
/// receiver catches up. A receiver not taken before the first transfer is
/// dropped, and events are then discarded.
pub struct UploadOrchestrator {
    client: FileServiceClient,
    config: UploaderConfig,
    events: EventSink,
    events_rx: Mutex<Option<mpsc::Receiver<FileServiceEvent>>>,
    cancel: CancellationToken,
}

impl UploadOrchestrator {
    /// Creates an orchestrator reporting to a fresh event channel.
    pub fn new(client: &FileServiceClient, config: UploaderConfig) -> Self {
        let (events, events_rx) = EventSink::channel(config.event_capacity);
        Self {
            client: client.with_events(events.clone()),
            config,
            events,
            events_rx: Mutex::new(Some(events_rx)),
            cancel: CancellationToken::new(),
        }
    }

    /// Takes the event receiver. Returns `None` once taken or once a
    /// transfer has started without it.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<FileServiceEvent>> {
        self.events_rx
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Returns a cancellation token for this orchestrator's transfers.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads `path` as the content of `resource_id`.
    ///
    /// Every failure except cancellation is also reported as an
    /// [`FileServiceEvent::UploadError`].
    pub async fn upload_file(
        &self,
        resource_id: u32,
        path: &Path,
    ) -> Result<UploadOutcome, UploadError> {
        self.discard_unclaimed_events();
        let result = self.run_upload(resource_id, path).await;
        match &result {
            Ok(outcome) => info!(
                resource_id,
                path = %path.display(),
                hash = outcome.file_hash(),
                "upload finished"
            ),
            Err(e) => self.report_failure(resource_id, e).await,
        }
        result
    }

    /// Downloads the content of `resource_id` into `destination`, naming the
    /// file after the service's reported file name.
    pub async fn download_file(
        &self,
        resource_id: u32,
        destination: &Path,
    ) -> Result<DownloadOutcome, UploadError> {
        self.discard_unclaimed_events();
        let result = self.run_download(resource_id, destination).await;
        match &result {
            Ok(outcome) => info!(
                resource_id,
                path = %outcome.path.display(),
                size = outcome.size,
                "download finished"
            ),
            Err(e) => self.report_failure(resource_id, e).await,
        }
        result
    }

    async fn run_upload(
        &self,
        resource_id: u32,
        path: &Path,
    ) -> Result<UploadOutcome, UploadError> {
        validate_resource_id(resource_id)?;
        let file_name = local_file_name(path)?;
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(UploadError::Validation(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let file_size = metadata.len();
        if file_size == 0 {
            return Err(UploadError::Validation(format!(
                "{} is empty",
                path.display()
            )));
        }

        // 1. Credential and existence check
        self.acquire_token(resource_id).await?;
        let precheck = self
            .check_remote(resource_id, path, &file_name, file_size)
            .await?;
        self.check_cancelled()?;
        let known_hash = match precheck {
            Precheck::Skip(file_hash) => {
                self.client.set_uploaded(resource_id).await?;
                info!(resource_id, %file_name, "identical file already stored, skipping upload");
                self.events
                    .emit(FileServiceEvent::FileUploadCompleted {
                        resource_id,
                        file_name: file_name.clone(),
                        file_hash: Some(file_hash.clone()),
                        started_at_utc: None,
                        finished_at_utc: None,
                    })
                    .await;
                return Ok(UploadOutcome::AlreadyUploaded {
                    file_name,
                    file_hash,
                });
            }
            Precheck::Upload(known_hash) => known_hash,
        };

        // 2. Session
        let session = self.open_session(resource_id).await?;
        self.events
            .emit(FileServiceEvent::SessionCreated {
                resource_id,
                session_id: session.session_id,
                chunk_size_bytes: session.chunk_size_bytes,
                max_file_size_megabytes: session.max_file_size_megabytes,
                started_by: session.started_by.clone(),
                started_at_utc: session.started_at_utc,
                expiration_minutes: session.expiration_minutes,
            })
            .await;
        self.check_cancelled()?;

        // 3. Parts
        let (parts, streamed_hash) = self
            .upload_parts(resource_id, path, &file_name, file_size, &session, known_hash.is_none())
            .await?;
        let file_hash = match known_hash {
            Some(hash) => hash,
            None => streamed_hash.ok_or_else(|| {
                UploadError::Validation("no digest was computed for the upload".into())
            })?,
        };

        // 4. Commit
        let session_id = session.session_id;
        let part_total = u32::try_from(parts.len())
            .map_err(|_| UploadError::Validation("too many parts".into()))?;
        self.events
            .emit(FileServiceEvent::Committing {
                resource_id,
                session_id,
                file_name: file_name.clone(),
                file_hash: file_hash.clone(),
                file_size,
                parts: parts.clone(),
            })
            .await;
        let outcome = self
            .client
            .commit(resource_id, session_id, &file_name, &file_hash, file_size, &parts)
            .await?;
        let committed = match outcome {
            CommitOutcome::Committed(session) => session,
            CommitOutcome::Pending => self.wait_for_commit(resource_id, session_id).await?,
            CommitOutcome::Failed(failure) => return Err(UploadError::Protocol(failure)),
        };

        self.events
            .emit(FileServiceEvent::FileUploadCompleted {
                resource_id,
                file_name,
                file_hash: committed.file_hash.clone(),
                started_at_utc: committed.started_at_utc,
                finished_at_utc: committed.finished_at_utc,
            })
            .await;
        Ok(UploadOutcome::Uploaded {
            session: committed,
            file_hash,
            part_count: part_total,
        })
    }

    async fn acquire_token(&self, resource_id: u32) -> Result<(), UploadError> {
        let token = self.client.acquire_access_token(resource_id).await?;
        if token.trim().is_empty() {
            return Err(UploadError::InvalidCredential);
        }
        Ok(())
    }

    /// Asks the service what it stores and hashes the local file only when
    /// the answer can be compared.
    async fn check_remote(
        &self,
        resource_id: u32,
        path: &Path,
        file_name: &str,
        file_size: u64,
    ) -> Result<Precheck, UploadError> {
        let info = match self.client.check_file(resource_id).await? {
            CheckFileResult::NotFound => {
                self.emit_checked(resource_id, None, RemoteFileInfo::default(), false, false)
                    .await;
                return Ok(Precheck::Upload(None));
            }
            CheckFileResult::Found(info) => info,
        };

        let Some(server_hash) = info.hash.clone() else {
            self.emit_checked(resource_id, None, info, true, false).await;
            return Ok(Precheck::Upload(None));
        };
        if info.file_name.as_deref().map(last_component) != Some(file_name) {
            debug!(resource_id, server = ?info.file_name, "stored file has another name");
            self.emit_checked(resource_id, None, info, true, false).await;
            return Ok(Precheck::Upload(None));
        }

        self.events
            .emit(FileServiceEvent::CalculatingHash {
                resource_id,
                path: path.to_path_buf(),
                size: file_size,
            })
            .await;
        let local_hash = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || digest_file(&path)
        })
        .await
        .map_err(|e| UploadError::Task(format!("task join error: {e}")))??;

        let matched = server_hash.eq_ignore_ascii_case(&local_hash);
        self.emit_checked(resource_id, Some(local_hash.clone()), info, true, matched)
            .await;
        if matched {
            Ok(Precheck::Skip(local_hash))
        } else {
            Ok(Precheck::Upload(Some(local_hash)))
        }
    }

    async fn emit_checked(
        &self,
        resource_id: u32,
        local_hash: Option<String>,
        info: RemoteFileInfo,
        found: bool,
        hash_matched: bool,
    ) {
        self.events
            .emit(FileServiceEvent::FileChecked {
                resource_id,
                found,
                hash_matched,
                local_hash,
                server_hash: info.hash,
                last_modified: info.last_modified,
                server_file_name: info.file_name,
            })
            .await;
    }

    /// Creates a session, replacing a leftover one at most once.
    async fn open_session(&self, resource_id: u32) -> Result<UploadSession, UploadError> {
        match self.client.create_session(resource_id).await {
            Ok(session) => Ok(session),
            Err(ClientError::Api(failure))
                if failure.error_code() == Some(ErrorCode::SessionAlreadyExists) =>
            {
                warn!(resource_id, "an upload session is already open, replacing it");
                if let Some(prior) = self.client.delete_session(resource_id).await? {
                    debug!(resource_id, session = %prior.session_id, "deleted prior session");
                }
                Ok(self.client.create_session(resource_id).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the file in session-sized parts. Returns the acknowledged
    /// parts and, when `hash_parts` is set, the digest of the streamed bytes.
    async fn upload_parts(
        &self,
        resource_id: u32,
        path: &Path,
        file_name: &str,
        file_size: u64,
        session: &UploadSession,
        hash_parts: bool,
    ) -> Result<(Vec<FilePart>, Option<String>), UploadError> {
        let session_id = session.session_id;
        let total = part_count(session.chunk_size_bytes, file_size);
        self.events
            .emit(FileServiceEvent::FileUploadStarted {
                resource_id,
                session_id,
                file_name: file_name.to_string(),
                part_count: total,
            })
            .await;
        info!(resource_id, session = %session_id, parts = total, "uploading parts");

        let eta = EtaEstimator::start(total);
        let eta = &eta;
        let mut hasher = IncrementalDigest::new();
        let parts = split(
            path,
            session.chunk_size_bytes,
            session.max_file_size_megabytes,
            |data: Bytes, part: FilePart| {
                let appended = if hash_parts {
                    hasher.append(&data)
                } else {
                    Ok(())
                };
                async move {
                    appended?;
                    self.check_cancelled()?;
                    self.send_part(resource_id, session_id, data, part, file_name, file_size, eta)
                        .await
                }
            },
        )
        .await?;

        let uploaded: u64 = parts.iter().map(|p| p.size).sum();
        if uploaded != file_size {
            return Err(UploadError::Validation(format!(
                "file changed during upload: {uploaded} of {file_size} bytes sent"
            )));
        }
        let streamed_hash = if hash_parts {
            Some(hasher.finalize()?)
        } else {
            None
        };
        Ok((parts, streamed_hash))
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_part(
        &self,
        resource_id: u32,
        session_id: Uuid,
        data: Bytes,
        part: FilePart,
        file_name: &str,
        file_size: u64,
        eta: &EtaEstimator,
    ) -> Result<(), UploadError> {
        let total = eta.total_parts();
        self.client
            .upload_part(resource_id, session_id, data, &part, file_name, file_size, total)
            .await?;

        let uploaded = part.id + 1;
        self.events
            .emit(FileServiceEvent::PartUploaded {
                resource_id,
                file_name: file_name.to_string(),
                part,
                status: 200,
                parts_uploaded: uploaded,
                part_count: total,
                estimated_remaining: eta.remaining_after(uploaded),
            })
            .await;
        Ok(())
    }

    /// Polls an accepted commit until it finishes or the attempts run out.
    async fn wait_for_commit(
        &self,
        resource_id: u32,
        session_id: Uuid,
    ) -> Result<UploadSession, UploadError> {
        let attempts = self.config.commit_poll_attempts;
        for attempt in 1..=attempts {
            self.events
                .emit(FileServiceEvent::CheckingCommit {
                    resource_id,
                    session_id,
                    attempt,
                })
                .await;
            match self.client.check_commit(resource_id, session_id).await? {
                CommitOutcome::Committed(session) => return Ok(session),
                CommitOutcome::Failed(failure) => return Err(UploadError::Protocol(failure)),
                CommitOutcome::Pending => {
                    debug!(resource_id, attempt, "commit still pending");
                }
            }

            if attempt < attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(UploadError::Cancelled),
                    _ = tokio::time::sleep(self.config.commit_poll_interval) => {}
                }
            }
        }
        Err(UploadError::CommitTimeout { attempts })
    }

    async fn run_download(
        &self,
        resource_id: u32,
        destination: &Path,
    ) -> Result<DownloadOutcome, UploadError> {
        validate_resource_id(resource_id)?;
        if destination.as_os_str().is_empty() {
            return Err(UploadError::Validation("destination folder is empty".into()));
        }
        if !tokio::fs::metadata(destination).await?.is_dir() {
            return Err(UploadError::Validation(format!(
                "{} is not a directory",
                destination.display()
            )));
        }

        self.acquire_token(resource_id).await?;
        self.check_cancelled()?;

        let Download { info, mut body } = self.client.download_file(resource_id).await?;
        let file_name = info.file_name.clone().ok_or_else(|| {
            UploadError::Validation("service did not name the downloaded file".into())
        })?;
        validate_file_name(&file_name)?;

        let path = destination.join(&file_name);
        let size = match self.write_body(&path, &mut body).await {
            Ok(size) => size,
            Err(e) => {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => debug!(path = %path.display(), "removed partial download"),
                    Err(rm) if rm.kind() == io::ErrorKind::NotFound => {}
                    Err(rm) => warn!(path = %path.display(), "could not remove partial download: {rm}"),
                }
                return Err(e);
            }
        };
        self.events
            .emit(FileServiceEvent::FileDownloaded {
                resource_id,
                path: path.clone(),
                size,
            })
            .await;

        Ok(DownloadOutcome { path, size, info })
    }

    /// Streams `body` into a new file at `path` and returns the bytes written.
    async fn write_body(&self, path: &Path, body: &mut ResponseBody) -> Result<u64, UploadError> {
        let mut file = tokio::fs::File::create(path).await?;
        let mut size = 0u64;
        while let Some(chunk) = body.next_chunk().await? {
            self.check_cancelled()?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(size)
    }

    fn check_cancelled(&self) -> Result<(), UploadError> {
        if self.cancel.is_cancelled() {
            Err(UploadError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn discard_unclaimed_events(&self) {
        let mut rx = self.events_rx.lock().unwrap_or_else(PoisonError::into_inner);
        if rx.take().is_some() {
            debug!("event receiver was never taken, discarding events");
        }
    }

    async fn report_failure(&self, resource_id: u32, err: &UploadError) {
        if matches!(err, UploadError::Cancelled) {
            info!(resource_id, "transfer cancelled");
            return;
        }
        error!(resource_id, error = %err, "transfer failed");
        let (url, status, body) = err.report();
        self.events
            .emit(FileServiceEvent::UploadError {
                resource_id,
                url,
                status,
                body,
            })
            .await;
    }
}

/// Final segment of a server-side file name, which may carry a folder.
fn last_component(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

fn validate_resource_id(resource_id: u32) -> Result<(), UploadError> {
    if resource_id == 0 {
        return Err(UploadError::Validation("resource id must be positive".into()));
    }
    Ok(())
}
