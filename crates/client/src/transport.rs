//! HTTP transport seam.
//!
//! `Transport` is implemented by [`ReqwestTransport`] in production and by
//! scripted mocks in tests. Requests are plain descriptions so the retry
//! policy can resend them with a refreshed credential.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use fileservice_protocol::constants::{
    HEADER_CONTENT_MD5, HEADER_CONTENT_RANGE, MEDIA_TYPE_JSON, MEDIA_TYPE_OCTET_STREAM,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::trace;

use crate::error::ClientError;
use crate::retry::RetryResponse;

/// Multipart field name for part uploads.
const PART_FIELD_NAME: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One file part sent as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct PartPayload {
    pub file_name: String,
    pub content_range: String,
    pub content_md5: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Bytes),
    Part(PartPayload),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub type ChunkFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<Bytes>, ClientError>> + Send + 'a>>;

/// Incremental reader over a response body.
pub trait BodyReader: Send {
    /// Next chunk, or `None` once the body is exhausted.
    fn next_chunk(&mut self) -> ChunkFuture<'_>;
}

/// Body of a [`StreamingResponse`].
pub enum ResponseBody {
    /// Already in memory. Non-success bodies are always buffered.
    Buffered(Bytes),
    Stream(Box<dyn BodyReader>),
}

impl ResponseBody {
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, ClientError> {
        match self {
            Self::Buffered(bytes) if bytes.is_empty() => Ok(None),
            Self::Buffered(bytes) => Ok(Some(std::mem::take(bytes))),
            Self::Stream(reader) => reader.next_chunk().await,
        }
    }

    /// Reads whatever is left into memory.
    pub async fn collect(self) -> Result<Bytes, ClientError> {
        match self {
            Self::Buffered(bytes) => Ok(bytes),
            Self::Stream(mut reader) => {
                let mut buf = Vec::new();
                while let Some(chunk) = reader.next_chunk().await? {
                    buf.extend_from_slice(&chunk);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// A response whose body has not necessarily been read yet.
#[derive(Debug)]
pub struct StreamingResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl StreamingResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Reads the body into memory.
    pub async fn into_buffered(self) -> Result<HttpResponse, ClientError> {
        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body: self.body.collect().await?,
        })
    }
}

impl From<HttpResponse> for StreamingResponse {
    fn from(resp: HttpResponse) -> Self {
        Self {
            status: resp.status,
            headers: resp.headers,
            body: ResponseBody::Buffered(resp.body),
        }
    }
}

impl RetryResponse for StreamingResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn retry_body(&self) -> String {
        match &self.body {
            ResponseBody::Buffered(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            ResponseBody::Stream(_) => String::new(),
        }
    }
}

pub type SendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClientError>> + Send + 'a>>;

/// Sends one HTTP request and returns the complete response.
///
/// Implementations must be safe to share across concurrent uploads.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> SendFuture<'_, HttpResponse>;

    /// Sends a request whose success body is read incrementally.
    ///
    /// The default buffers through [`Transport::send`].
    fn send_streaming(&self, request: HttpRequest) -> SendFuture<'_, StreamingResponse> {
        Box::pin(async move { self.send(request).await.map(StreamingResponse::from) })
    }
}

/// `reqwest`-backed transport with one pooled client for the process.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(MEDIA_TYPE_JSON));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    fn prepare(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, ClientError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.http.request(method, &request.url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        Ok(match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(json) => builder
                .header(CONTENT_TYPE, MEDIA_TYPE_JSON)
                .body(json),
            RequestBody::Part(part) => builder.multipart(build_form(part)?),
        })
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let url = request.url.clone();
        let resp = self.prepare(request)?.send().await?;
        let status = resp.status().as_u16();
        let headers = response_headers(&resp);
        let body = resp.bytes().await?;

        trace!(%url, status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_streaming(&self, request: HttpRequest) -> Result<StreamingResponse, ClientError> {
        let url = request.url.clone();
        let resp = self.prepare(request)?.send().await?;
        let status = resp.status().as_u16();
        let headers = response_headers(&resp);
        let body = if resp.status().is_success() {
            ResponseBody::Stream(Box::new(ReqwestBody(resp)))
        } else {
            ResponseBody::Buffered(resp.bytes().await?)
        };

        trace!(%url, status, "response head received");
        Ok(StreamingResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> SendFuture<'_, HttpResponse> {
        Box::pin(self.execute(request))
    }

    fn send_streaming(&self, request: HttpRequest) -> SendFuture<'_, StreamingResponse> {
        Box::pin(self.execute_streaming(request))
    }
}

struct ReqwestBody(reqwest::Response);

impl BodyReader for ReqwestBody {
    fn next_chunk(&mut self) -> ChunkFuture<'_> {
        Box::pin(async move { Ok(self.0.chunk().await?) })
    }
}

fn response_headers(resp: &reqwest::Response) -> Vec<(String, String)> {
    resp.headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn build_form(part: PartPayload) -> Result<reqwest::multipart::Form, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(HEADER_CONTENT_RANGE),
        header_value(HEADER_CONTENT_RANGE, &part.content_range)?,
    );
    headers.insert(
        HeaderName::from_static(HEADER_CONTENT_MD5),
        header_value(HEADER_CONTENT_MD5, &part.content_md5)?,
    );

    let len = part.data.len() as u64;
    let file = reqwest::multipart::Part::stream_with_length(part.data, len)
        .headers(headers)
        .file_name(part.file_name)
        .mime_str(MEDIA_TYPE_OCTET_STREAM)?;
    Ok(reqwest::multipart::Form::new().part(PART_FIELD_NAME, file))
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader {
        name: name.to_string(),
    })
}
