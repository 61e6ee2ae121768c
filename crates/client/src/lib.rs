//! Client for the Metadata File Service.
//!
//! [`FileServiceClient`] wraps each service call in a [`RetryPolicy`] and
//! reports protocol traffic as [`FileServiceEvent`]s.

mod client;
pub mod error;
pub mod events;
pub mod retry;
pub mod token;
pub mod transport;
pub mod types;

pub use client::{FileServiceClient, normalize_base_url};
pub use error::{ApiFailure, ClientError};
pub use events::{EventSink, FileServiceEvent};
pub use retry::{RetryAttempt, RetryConfig, RetryPolicy, RetryResponse, is_retryable_status};
pub use token::{StaticTokenProvider, TokenFuture, TokenProvider};
pub use transport::{
    BodyReader, ChunkFuture, HttpRequest, HttpResponse, Method, PartPayload, ReqwestTransport,
    RequestBody, ResponseBody, SendFuture, StreamingResponse, Transport,
};
pub use types::{
    CheckFileResult, ClientConfig, CommitOutcome, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, Download,
    RemoteFileInfo,
};

// Wire types carried by events and results.
pub use fileservice_protocol::{FilePart, UploadSession};
