//! Metadata File Service client.
//!
//! Every operation builds one request, sends it through the retry policy,
//! and classifies the final response. Navigation events bracket each call.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use fileservice_protocol::constants::{
    HEADER_CONTENT_DISPOSITION, HEADER_CONTENT_MD5, HEADER_LAST_MODIFIED, commit_path, file_path,
    set_uploaded_path, upload_session_path, upload_sessions_path,
};
use fileservice_protocol::headers::{
    content_range, decode_content_md5, disposition_file_name, encode_content_md5, parse_http_date,
};
use fileservice_protocol::{CommitRequest, FilePart, UploadSession};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiFailure, ClientError};
use crate::events::{EventSink, FileServiceEvent};
use crate::retry::{RetryAttempt, RetryConfig, RetryPolicy, RetryResponse};
use crate::token::TokenProvider;
use crate::transport::{
    HttpRequest, HttpResponse, Method, PartPayload, ReqwestTransport, RequestBody,
    StreamingResponse, Transport, find_header,
};
use crate::types::{CheckFileResult, ClientConfig, CommitOutcome, Download, RemoteFileInfo};

const STATUS_OK: u16 = 200;
const STATUS_ACCEPTED: u16 = 202;
const STATUS_NO_CONTENT: u16 = 204;
const STATUS_NOT_FOUND: u16 = 404;

/// Cheaply cloneable handle to the service.
///
/// Clones share the transport and the current credential; a refreshed token
/// is visible to every clone.
#[derive(Clone)]
pub struct FileServiceClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    token: Arc<RwLock<Option<String>>>,
    base_url: String,
    retry: RetryPolicy,
    events: EventSink,
}

impl FileServiceClient {
    /// Creates a client backed by a pooled `reqwest` transport.
    pub fn new(config: &ClientConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, ClientError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Self::with_transport(&config.base_url, config.retry.clone(), transport, tokens)
    }

    /// Creates a client over an arbitrary transport.
    pub fn with_transport(
        base_url: &str,
        retry: RetryConfig,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            transport,
            tokens,
            token: Arc::new(RwLock::new(None)),
            base_url: normalize_base_url(base_url)?,
            retry: RetryPolicy::new(retry),
            events: EventSink::disabled(),
        })
    }

    /// Returns a handle that reports to `events`, sharing everything else.
    pub fn with_events(&self, events: EventSink) -> Self {
        Self {
            events,
            ..self.clone()
        }
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Credentials
    // -----------------------------------------------------------------------

    /// Fetches a token from the provider and makes it current.
    pub async fn acquire_access_token(&self, resource_id: u32) -> Result<String, ClientError> {
        self.events
            .emit(FileServiceEvent::AccessTokenRequested { resource_id })
            .await;
        let token = self.tokens.access_token().await?;
        *self.token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Swaps in a freshly minted token. Failure keeps the old one.
    async fn refresh_access_token(&self, resource_id: u32) {
        self.events
            .emit(FileServiceEvent::NewAccessTokenRequested { resource_id })
            .await;
        match self.tokens.new_access_token().await {
            Ok(token) => {
                *self.token.write().await = Some(token);
                info!(resource_id, "access token refreshed");
            }
            Err(e) => warn!(resource_id, "access token refresh failed: {e}"),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// `HEAD Files({id})`: whether the service already stores a file.
    pub async fn check_file(&self, resource_id: u32) -> Result<CheckFileResult, ClientError> {
        validate_resource_id(resource_id)?;
        let (url, resp) = self
            .execute(resource_id, Method::Head, &file_path(resource_id), RequestBody::Empty, true)
            .await?;

        match resp.status {
            STATUS_NO_CONTENT => Ok(CheckFileResult::Found(remote_file_info(&resp.headers))),
            STATUS_NOT_FOUND => Ok(CheckFileResult::NotFound),
            _ => Err(ClientError::Api(ApiFailure::from_response(&url, &resp))),
        }
    }

    /// `POST Files({id})/UploadSessions`.
    pub async fn create_session(&self, resource_id: u32) -> Result<UploadSession, ClientError> {
        validate_resource_id(resource_id)?;
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Post,
                &upload_sessions_path(resource_id),
                RequestBody::Empty,
                true,
            )
            .await?;

        if resp.status != STATUS_OK {
            return Err(ClientError::Api(ApiFailure::from_response(&url, &resp)));
        }
        Ok(serde_json::from_slice(&resp.body)?)
    }

    /// `PUT Files({id})/UploadSessions({session})` with one part.
    #[allow(clippy::too_many_arguments)]
    pub async fn upload_part(
        &self,
        resource_id: u32,
        session_id: Uuid,
        data: Bytes,
        part: &FilePart,
        file_name: &str,
        full_size: u64,
        part_count: u32,
    ) -> Result<(), ClientError> {
        validate_resource_id(resource_id)?;
        validate_session_id(session_id)?;
        if part_count == 0 || part.id >= part_count {
            return Err(ClientError::Validation(format!(
                "part {} out of range for {part_count} parts",
                part.id
            )));
        }
        if data.len() as u64 != part.size {
            return Err(ClientError::Validation(format!(
                "part {} declares {} bytes but carries {}",
                part.id,
                part.size,
                data.len()
            )));
        }

        let body = RequestBody::Part(PartPayload {
            file_name: file_name.to_string(),
            content_range: content_range(part.offset, part.size, full_size),
            content_md5: encode_content_md5(&part.hash),
            data,
        });
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Put,
                &upload_session_path(resource_id, session_id),
                body,
                true,
            )
            .await?;

        if resp.status != STATUS_OK {
            return Err(ClientError::Api(ApiFailure::from_response(&url, &resp)));
        }
        debug!(resource_id, part = part.id, offset = part.offset, "part accepted");
        Ok(())
    }

    /// `POST .../MetadataService.Commit` with the full part list.
    pub async fn commit(
        &self,
        resource_id: u32,
        session_id: Uuid,
        file_name: &str,
        file_hash: &str,
        file_size: u64,
        parts: &[FilePart],
    ) -> Result<CommitOutcome, ClientError> {
        validate_resource_id(resource_id)?;
        validate_session_id(session_id)?;

        let request = CommitRequest::new(file_name, file_hash, file_size, parts);
        let body = RequestBody::Json(Bytes::from(serde_json::to_vec(&request)?));
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Post,
                &commit_path(resource_id, session_id),
                body,
                true,
            )
            .await?;
        classify_commit(&url, &resp)
    }

    /// `GET Files({id})/UploadSessions({session})`: polls an accepted commit.
    pub async fn check_commit(
        &self,
        resource_id: u32,
        session_id: Uuid,
    ) -> Result<CommitOutcome, ClientError> {
        validate_resource_id(resource_id)?;
        validate_session_id(session_id)?;
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Get,
                &upload_session_path(resource_id, session_id),
                RequestBody::Empty,
                true,
            )
            .await?;
        classify_commit(&url, &resp)
    }

    /// `DELETE Files({id})/UploadSessions`. Returns the session that was open,
    /// when the service describes it.
    pub async fn delete_session(
        &self,
        resource_id: u32,
    ) -> Result<Option<UploadSession>, ClientError> {
        validate_resource_id(resource_id)?;
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Delete,
                &upload_sessions_path(resource_id),
                RequestBody::Empty,
                true,
            )
            .await?;

        if resp.status != STATUS_OK {
            return Err(ClientError::Api(ApiFailure::from_response(&url, &resp)));
        }
        if resp.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&resp.body)?))
    }

    /// `POST Files({id})/MetadataService.SetUploaded`: marks a stored file
    /// as uploaded without transferring it.
    pub async fn set_uploaded(&self, resource_id: u32) -> Result<(), ClientError> {
        validate_resource_id(resource_id)?;
        let (url, resp) = self
            .execute(
                resource_id,
                Method::Post,
                &set_uploaded_path(resource_id),
                RequestBody::Empty,
                true,
            )
            .await?;

        if !resp.is_success() {
            return Err(ClientError::Api(ApiFailure::from_response(&url, &resp)));
        }
        Ok(())
    }

    /// `GET Files({id})`: the stored file and its metadata.
    ///
    /// Only the response head is read here; the body streams from
    /// [`Download::body`].
    pub async fn download_file(&self, resource_id: u32) -> Result<Download, ClientError> {
        validate_resource_id(resource_id)?;
        let url = self.url(&file_path(resource_id));
        let url_ref = url.as_str();
        let resp = self
            .dispatch(resource_id, Method::Get, url_ref, false, || {
                self.send_streaming_once(url_ref)
            })
            .await?;

        if resp.status != STATUS_OK {
            let resp = resp.into_buffered().await?;
            return Err(ClientError::Api(ApiFailure::from_response(&url, &resp)));
        }
        Ok(Download {
            info: remote_file_info(&resp.headers),
            body: resp.body,
        })
    }

    // -----------------------------------------------------------------------
    // Plumbing
    // -----------------------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends one logical call through the retry policy.
    ///
    /// `report_body` controls whether the response body is copied into the
    /// navigated event.
    async fn execute(
        &self,
        resource_id: u32,
        method: Method,
        path: &str,
        body: RequestBody,
        report_body: bool,
    ) -> Result<(String, HttpResponse), ClientError> {
        let url = self.url(path);
        let url_ref = url.as_str();
        let body_ref = &body;
        let resp = self
            .dispatch(resource_id, method, url_ref, report_body, || {
                self.send_once(method, url_ref, body_ref)
            })
            .await?;
        Ok((url, resp))
    }

    /// Brackets `send` with navigation events and runs it under the retry
    /// policy.
    async fn dispatch<R, S, SFut>(
        &self,
        resource_id: u32,
        method: Method,
        url: &str,
        report_body: bool,
        send: S,
    ) -> Result<R, ClientError>
    where
        R: RetryResponse,
        S: FnMut() -> SFut,
        SFut: Future<Output = Result<R, ClientError>>,
    {
        self.events
            .emit(FileServiceEvent::Navigating {
                resource_id,
                method,
                url: url.to_string(),
            })
            .await;
        debug!(resource_id, %method, %url, "sending request");

        let outcome = self
            .retry
            .run(send, |attempt| {
                self.before_retry(resource_id, method, url, attempt)
            })
            .await;

        let (status, reported) = match &outcome {
            Ok(resp) => (Some(resp.status()), report_body.then(|| resp.retry_body())),
            Err(e) => (None, Some(e.to_string())),
        };
        self.events
            .emit(FileServiceEvent::Navigated {
                resource_id,
                method,
                url: url.to_string(),
                status,
                body: reported,
            })
            .await;

        outcome
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: &RequestBody,
    ) -> Result<HttpResponse, ClientError> {
        let bearer = self.token.read().await.clone();
        self.transport
            .send(HttpRequest {
                method,
                url: url.to_string(),
                bearer,
                body: body.clone(),
            })
            .await
    }

    async fn send_streaming_once(&self, url: &str) -> Result<StreamingResponse, ClientError> {
        let bearer = self.token.read().await.clone();
        self.transport
            .send_streaming(HttpRequest {
                method: Method::Get,
                url: url.to_string(),
                bearer,
                body: RequestBody::Empty,
            })
            .await
    }

    async fn before_retry(&self, resource_id: u32, method: Method, url: &str, attempt: RetryAttempt) {
        if attempt.is_unauthorized() {
            self.refresh_access_token(resource_id).await;
        }
        self.events
            .emit(FileServiceEvent::TransientError {
                resource_id,
                method,
                url: url.to_string(),
                status: attempt.status,
                body: attempt.body,
                retry: attempt.retry,
                max_retries: attempt.max_retries,
            })
            .await;
    }
}

/// Validates the base URL and ensures it ends with `/`.
pub fn normalize_base_url(base_url: &str) -> Result<String, ClientError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidBaseUrl("empty".into()));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ClientError::InvalidBaseUrl(format!(
            "{trimmed} is not an http(s) URL"
        )));
    }
    let mut url = trimmed.to_string();
    if !url.ends_with('/') {
        url.push('/');
    }
    Ok(url)
}

fn validate_resource_id(resource_id: u32) -> Result<(), ClientError> {
    if resource_id == 0 {
        return Err(ClientError::Validation("resource id must be positive".into()));
    }
    Ok(())
}

fn validate_session_id(session_id: Uuid) -> Result<(), ClientError> {
    if session_id.is_nil() {
        return Err(ClientError::Validation("session id is nil".into()));
    }
    Ok(())
}

fn remote_file_info(headers: &[(String, String)]) -> RemoteFileInfo {
    RemoteFileInfo {
        last_modified: find_header(headers, HEADER_LAST_MODIFIED).and_then(parse_http_date),
        hash: find_header(headers, HEADER_CONTENT_MD5).and_then(decode_content_md5),
        file_name: find_header(headers, HEADER_CONTENT_DISPOSITION)
            .and_then(disposition_file_name),
    }
}

fn classify_commit(url: &str, resp: &HttpResponse) -> Result<CommitOutcome, ClientError> {
    match resp.status {
        STATUS_OK => Ok(CommitOutcome::Committed(serde_json::from_slice(&resp.body)?)),
        STATUS_ACCEPTED => Ok(CommitOutcome::Pending),
        _ => Ok(CommitOutcome::Failed(ApiFailure::from_response(url, resp))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use fileservice_protocol::ErrorCode;
    use tokio::sync::mpsc;

    use crate::token::TokenFuture;

    const SESSION_ID: &str = "8f1c2a4e-4b59-4a3c-9d55-0c8b2f3d6a71";

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    struct MockTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, ClientError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl MockTransport {
        fn new(responses: Vec<Result<HttpResponse, ClientError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl Transport for MockTransport {
        fn send(
            &self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, ClientError>> + Send + '_>> {
            Box::pin(async move {
                let label = format!("{} {}", request.method, request.url);
                self.requests.lock().unwrap().push(request);
                self.responses
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| panic!("unexpected request: {label}"))
            })
        }
    }

    /// Hands out `tok-0`, then `tok-N` for the N-th refresh.
    #[derive(Default)]
    struct CountingTokens {
        refreshes: AtomicU32,
    }

    impl TokenProvider for CountingTokens {
        fn access_token(&self) -> TokenFuture<'_> {
            Box::pin(async { Ok("tok-0".to_string()) })
        }

        fn new_access_token(&self) -> TokenFuture<'_> {
            Box::pin(async move {
                let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(format!("tok-{n}"))
            })
        }
    }

    fn session_json() -> String {
        format!(
            r#"{{"SessionId":"{SESSION_ID}","FileUploadChunkSizeInBytes":1,"FileUploadMaxFileSizeInMegabytes":1,"FileUploadSessionExpirationInMinutes":30}}"#
        )
    }

    fn session_id() -> Uuid {
        Uuid::parse_str(SESSION_ID).unwrap()
    }

    fn client(
        transport: Arc<MockTransport>,
        tokens: Arc<CountingTokens>,
        max_retries: u32,
    ) -> (FileServiceClient, mpsc::Receiver<FileServiceEvent>) {
        let (sink, rx) = EventSink::channel(256);
        let client = FileServiceClient::with_transport(
            "http://svc/api",
            RetryConfig {
                max_retries,
                backoff: Duration::from_secs(2),
            },
            transport,
            tokens,
        )
        .unwrap()
        .with_events(sink);
        (client, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<FileServiceEvent>) -> Vec<FileServiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn check_file_found_reads_metadata() {
        let hex = "5d41402abc4b2a76b9719d911017c592";
        let transport = MockTransport::new(vec![Ok(HttpResponse::new(204)
            .with_header("Content-MD5", &encode_content_md5(hex))
            .with_header("Content-Disposition", "attachment; filename=\"a.txt\"")
            .with_header("Last-Modified", "Sat, 20 Oct 2018 12:30:00 GMT"))]);
        let (client, mut rx) = client(transport.clone(), Arc::default(), 3);

        client.acquire_access_token(7).await.unwrap();
        let result = client.check_file(7).await.unwrap();

        let CheckFileResult::Found(info) = result else {
            panic!("expected Found, got {result:?}");
        };
        assert_eq!(info.hash.as_deref(), Some(hex));
        assert_eq!(info.file_name.as_deref(), Some("a.txt"));
        assert_eq!(
            info.last_modified.unwrap().to_rfc3339(),
            "2018-10-20T12:30:00+00:00"
        );

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Head);
        assert_eq!(requests[0].url, "http://svc/api/Files(7)");
        assert_eq!(requests[0].bearer.as_deref(), Some("tok-0"));

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                FileServiceEvent::AccessTokenRequested { resource_id: 7 },
                FileServiceEvent::Navigating {
                    resource_id: 7,
                    method: Method::Head,
                    url: "http://svc/api/Files(7)".into(),
                },
                FileServiceEvent::Navigated {
                    resource_id: 7,
                    method: Method::Head,
                    url: "http://svc/api/Files(7)".into(),
                    status: Some(204),
                    body: Some(String::new()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn check_file_not_found_and_failure() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(404)),
            Ok(HttpResponse::new(403).with_body("forbidden")),
        ]);
        let (client, _rx) = client(transport, Arc::default(), 3);

        assert_eq!(client.check_file(7).await.unwrap(), CheckFileResult::NotFound);
        let err = client.check_file(7).await.unwrap_err();
        let ClientError::Api(failure) = err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!(failure.status, 403);
        assert_eq!(failure.body, "forbidden");
        assert_eq!(failure.url, "http://svc/api/Files(7)");
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_refreshes_token_before_each_retry() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(401)),
            Ok(HttpResponse::new(401)),
            Ok(HttpResponse::new(404)),
        ]);
        let tokens = Arc::new(CountingTokens::default());
        let (client, mut rx) = client(transport.clone(), tokens.clone(), 3);

        client.acquire_access_token(7).await.unwrap();
        assert_eq!(client.check_file(7).await.unwrap(), CheckFileResult::NotFound);

        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 2);
        let bearers: Vec<_> = transport
            .requests()
            .into_iter()
            .map(|r| r.bearer.unwrap())
            .collect();
        assert_eq!(bearers, vec!["tok-0", "tok-1", "tok-2"]);

        let kinds: Vec<_> = drain(&mut rx)
            .into_iter()
            .map(|e| match e {
                FileServiceEvent::AccessTokenRequested { .. } => "token",
                FileServiceEvent::Navigating { .. } => "navigating",
                FileServiceEvent::NewAccessTokenRequested { .. } => "new-token",
                FileServiceEvent::TransientError { .. } => "transient",
                FileServiceEvent::Navigated { .. } => "navigated",
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "token",
                "navigating",
                "new-token",
                "transient",
                "new-token",
                "transient",
                "navigated"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_unauthorized_surfaces_last_response() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(401).with_body("a")),
            Ok(HttpResponse::new(401).with_body("b")),
            Ok(HttpResponse::new(401).with_body("c")),
        ]);
        let tokens = Arc::new(CountingTokens::default());
        let (client, mut rx) = client(transport.clone(), tokens.clone(), 2);

        let err = client.check_file(7).await.unwrap_err();
        let ClientError::Api(failure) = err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!((failure.status, failure.body.as_str()), (401, "c"));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(tokens.refreshes.load(Ordering::SeqCst), 2);

        let transient: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                FileServiceEvent::TransientError {
                    retry,
                    max_retries,
                    status,
                    body,
                    ..
                } => Some((retry, max_retries, status, body)),
                _ => None,
            })
            .collect();
        assert_eq!(
            transient,
            vec![
                (1, 2, Some(401), "a".to_string()),
                (2, 2, Some(401), "b".to_string())
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_reported_in_navigated() {
        let transport = MockTransport::new(vec![
            Err(ClientError::Transport("reset".into())),
            Err(ClientError::Transport("reset".into())),
        ]);
        let (client, mut rx) = client(transport, Arc::default(), 1);

        assert!(client.check_file(7).await.unwrap_err().is_transient());
        let last = drain(&mut rx).pop().unwrap();
        assert!(matches!(
            last,
            FileServiceEvent::Navigated { status: None, body: Some(ref b), .. } if b.contains("reset")
        ));
    }

    #[tokio::test]
    async fn create_session_parses_and_reports_error_code() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(200).with_body(session_json())),
            Ok(HttpResponse::new(400).with_body(r#"{"ErrorCode":"SessionAlreadyExists"}"#)),
        ]);
        let (client, _rx) = client(transport.clone(), Arc::default(), 3);

        let session = client.create_session(7).await.unwrap();
        assert_eq!(session.session_id, session_id());
        assert_eq!(transport.requests()[0].method, Method::Post);
        assert_eq!(transport.requests()[0].url, "http://svc/api/Files(7)/UploadSessions");

        let err = client.create_session(7).await.unwrap_err();
        let ClientError::Api(failure) = err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!(failure.error_code(), Some(ErrorCode::SessionAlreadyExists));
    }

    #[tokio::test]
    async fn upload_part_builds_multipart_description() {
        let transport = MockTransport::new(vec![Ok(HttpResponse::new(200))]);
        let (client, _rx) = client(transport.clone(), Arc::default(), 3);

        let part = FilePart {
            id: 1,
            hash: "0cc175b9c0f1b6a831c399e269772661".into(),
            size: 1,
            offset: 1,
        };
        client
            .upload_part(7, session_id(), Bytes::from_static(b"a"), &part, "a.txt", 3, 3)
            .await
            .unwrap();

        let request = transport.requests().remove(0);
        assert_eq!(request.method, Method::Put);
        assert_eq!(
            request.url,
            format!("http://svc/api/Files(7)/UploadSessions({SESSION_ID})")
        );
        let RequestBody::Part(payload) = request.body else {
            panic!("expected multipart body");
        };
        assert_eq!(payload.file_name, "a.txt");
        assert_eq!(payload.content_range, "bytes 1-1/3");
        assert_eq!(
            decode_content_md5(&payload.content_md5).as_deref(),
            Some("0cc175b9c0f1b6a831c399e269772661")
        );
        assert_eq!(payload.data.as_ref(), b"a");
    }

    #[tokio::test]
    async fn upload_part_validates_before_sending() {
        let transport = MockTransport::new(vec![]);
        let (client, _rx) = client(transport.clone(), Arc::default(), 3);
        let part = FilePart {
            id: 0,
            hash: "h".into(),
            size: 1,
            offset: 0,
        };
        let data = Bytes::from_static(b"a");

        let cases = [
            client.upload_part(0, session_id(), data.clone(), &part, "a", 1, 1).await,
            client.upload_part(7, Uuid::nil(), data.clone(), &part, "a", 1, 1).await,
            client.upload_part(7, session_id(), data.clone(), &part, "a", 1, 0).await,
            client.upload_part(7, session_id(), Bytes::new(), &part, "a", 1, 1).await,
        ];
        for result in cases {
            assert!(matches!(result, Err(ClientError::Validation(_))), "{result:?}");
        }
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn commit_outcomes() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(202)),
            Ok(HttpResponse::new(200).with_body(session_json())),
            Ok(HttpResponse::new(400).with_body(r#"{"ErrorCode":null,"Message":"bad parts"}"#)),
        ]);
        let (client, _rx) = client(transport.clone(), Arc::default(), 3);
        let parts = vec![FilePart {
            id: 0,
            hash: "h0".into(),
            size: 3,
            offset: 0,
        }];

        let first = client
            .commit(7, session_id(), "a.txt", "whole", 3, &parts)
            .await
            .unwrap();
        assert_eq!(first, CommitOutcome::Pending);

        let second = client.check_commit(7, session_id()).await.unwrap();
        assert!(matches!(second, CommitOutcome::Committed(ref s) if s.session_id == session_id()));

        let third = client.check_commit(7, session_id()).await.unwrap();
        let CommitOutcome::Failed(failure) = third else {
            panic!("expected Failed, got {third:?}");
        };
        assert_eq!(failure.status, 400);
        assert!(failure.error_code.is_none());

        let requests = transport.requests();
        assert_eq!(
            requests[0].url,
            format!("http://svc/api/Files(7)/UploadSessions({SESSION_ID})/MetadataService.Commit")
        );
        let RequestBody::Json(json) = &requests[0].body else {
            panic!("expected JSON body");
        };
        let value: serde_json::Value = serde_json::from_slice(json).unwrap();
        assert_eq!(value["FileDetail"]["Hash"], "whole");
        assert_eq!(value["FileDetail"]["Parts"][0]["Size"], 3);
        assert_eq!(requests[1].method, Method::Get);
        assert_eq!(
            requests[1].url,
            format!("http://svc/api/Files(7)/UploadSessions({SESSION_ID})")
        );
    }

    #[tokio::test]
    async fn delete_session_and_set_uploaded() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(200).with_body(session_json())),
            Ok(HttpResponse::new(200)),
            Ok(HttpResponse::new(204)),
        ]);
        let (client, _rx) = client(transport.clone(), Arc::default(), 3);

        let prior = client.delete_session(7).await.unwrap();
        assert_eq!(prior.unwrap().session_id, session_id());
        assert!(client.delete_session(7).await.unwrap().is_none());
        client.set_uploaded(7).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Delete);
        assert_eq!(requests[0].url, "http://svc/api/Files(7)/UploadSessions");
        assert_eq!(requests[2].method, Method::Post);
        assert_eq!(
            requests[2].url,
            "http://svc/api/Files(7)/MetadataService.SetUploaded"
        );
    }

    #[tokio::test]
    async fn download_omits_body_from_events() {
        let transport = MockTransport::new(vec![Ok(HttpResponse::new(200)
            .with_header("Content-Disposition", "attachment; filename=report.csv")
            .with_body("a,b\n1,2\n"))]);
        let (client, mut rx) = client(transport, Arc::default(), 3);

        let download = client.download_file(7).await.unwrap();
        assert_eq!(download.info.file_name.as_deref(), Some("report.csv"));
        assert_eq!(download.body.collect().await.unwrap().as_ref(), b"a,b\n1,2\n");

        let last = drain(&mut rx).pop().unwrap();
        assert!(matches!(
            last,
            FileServiceEvent::Navigated { status: Some(200), body: None, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn download_retries_then_reports_rejection() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(503).with_body("busy")),
            Ok(HttpResponse::new(404).with_body("gone")),
        ]);
        let (client, mut rx) = client(transport.clone(), Arc::default(), 3);

        let err = client.download_file(7).await.unwrap_err();
        let ClientError::Api(failure) = err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!((failure.status, failure.body.as_str()), (404, "gone"));
        assert_eq!(transport.requests().len(), 2);

        let transient = drain(&mut rx)
            .into_iter()
            .find_map(|e| match e {
                FileServiceEvent::TransientError { status, body, .. } => Some((status, body)),
                _ => None,
            });
        assert_eq!(transient, Some((Some(503), "busy".to_string())));
    }

    #[test]
    fn base_url_normalization() {
        assert_eq!(normalize_base_url("http://svc/api").unwrap(), "http://svc/api/");
        assert_eq!(normalize_base_url(" https://svc/ ").unwrap(), "https://svc/");
        assert!(matches!(
            normalize_base_url(""),
            Err(ClientError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            normalize_base_url("ftp://svc"),
            Err(ClientError::InvalidBaseUrl(_))
        ));
    }
}
