//! Progress and protocol notifications.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fileservice_protocol::FilePart;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::transport::Method;

/// Everything observable about an upload or download, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum FileServiceEvent {
    /// A call is about to be sent (once per call, not per retry).
    Navigating {
        resource_id: u32,
        method: Method,
        url: String,
    },
    /// A call finished. `status` is `None` when no response arrived;
    /// `body` is omitted for downloads.
    Navigated {
        resource_id: u32,
        method: Method,
        url: String,
        status: Option<u16>,
        body: Option<String>,
    },
    /// A transient failure is being retried.
    TransientError {
        resource_id: u32,
        method: Method,
        url: String,
        status: Option<u16>,
        body: String,
        retry: u32,
        max_retries: u32,
    },
    AccessTokenRequested {
        resource_id: u32,
    },
    NewAccessTokenRequested {
        resource_id: u32,
    },
    FileChecked {
        resource_id: u32,
        found: bool,
        hash_matched: bool,
        local_hash: Option<String>,
        server_hash: Option<String>,
        last_modified: Option<DateTime<Utc>>,
        server_file_name: Option<String>,
    },
    CalculatingHash {
        resource_id: u32,
        path: PathBuf,
        size: u64,
    },
    SessionCreated {
        resource_id: u32,
        session_id: Uuid,
        chunk_size_bytes: u64,
        max_file_size_megabytes: u64,
        started_by: Option<String>,
        started_at_utc: Option<DateTime<Utc>>,
        expiration_minutes: u64,
    },
    FileUploadStarted {
        resource_id: u32,
        session_id: Uuid,
        file_name: String,
        part_count: u32,
    },
    PartUploaded {
        resource_id: u32,
        file_name: String,
        part: FilePart,
        status: u16,
        parts_uploaded: u32,
        part_count: u32,
        estimated_remaining: Option<Duration>,
    },
    Committing {
        resource_id: u32,
        session_id: Uuid,
        file_name: String,
        file_hash: String,
        file_size: u64,
        parts: Vec<FilePart>,
    },
    CheckingCommit {
        resource_id: u32,
        session_id: Uuid,
        attempt: u32,
    },
    FileUploadCompleted {
        resource_id: u32,
        file_name: String,
        file_hash: Option<String>,
        started_at_utc: Option<DateTime<Utc>>,
        finished_at_utc: Option<DateTime<Utc>>,
    },
    FileDownloaded {
        resource_id: u32,
        path: PathBuf,
        size: u64,
    },
    /// A fatal failure. `url` and `status` are set when the service
    /// rejected a call; otherwise `body` carries the local error.
    UploadError {
        resource_id: u32,
        url: Option<String>,
        status: Option<u16>,
        body: String,
    },
}

/// Event sender.
///
/// A full channel makes the sender wait for the receiver, so nothing is
/// lost. Events sent after the receiver is dropped are discarded.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<FileServiceEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<FileServiceEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates a sink and the receiver for its events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FileServiceEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub async fn emit(&self, event: FileServiceEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() {
            debug!("event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_requested(resource_id: u32) -> FileServiceEvent {
        FileServiceEvent::AccessTokenRequested { resource_id }
    }

    #[tokio::test]
    async fn emits_in_order() {
        let (sink, mut rx) = EventSink::channel(8);
        sink.emit(token_requested(1)).await;
        sink.emit(FileServiceEvent::NewAccessTokenRequested { resource_id: 1 })
            .await;

        assert_eq!(rx.recv().await, Some(token_requested(1)));
        assert_eq!(
            rx.recv().await,
            Some(FileServiceEvent::NewAccessTokenRequested { resource_id: 1 })
        );
    }

    #[tokio::test]
    async fn full_channel_waits_for_receiver() {
        let (sink, mut rx) = EventSink::channel(1);
        let sender = tokio::spawn(async move {
            for id in 1..=100 {
                sink.emit(token_requested(id)).await;
            }
        });

        tokio::task::yield_now().await;
        assert!(!sender.is_finished());

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        sender.await.unwrap();
        assert_eq!(received, (1..=100).map(token_requested).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn disabled_and_closed_sinks_are_silent() {
        EventSink::disabled().emit(token_requested(1)).await;

        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.emit(token_requested(1)).await;
        sink.emit(token_requested(2)).await;
    }
}
