use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ClientError;
use crate::transport::HttpResponse;

/// Statuses treated as transient: unauthorized, request timeout, conflict,
/// internal server error, bad gateway, service unavailable, gateway timeout.
const RETRYABLE_STATUSES: [u16; 7] = [401, 408, 409, 500, 502, 503, 504];

pub const STATUS_UNAUTHORIZED: u16 = 401;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Details of a transient failure that is about to be retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// 1-based number of the retry about to happen.
    pub retry: u32,
    pub max_retries: u32,
    /// `None` when the request failed below HTTP.
    pub status: Option<u16>,
    /// Response body, or the transport error message.
    pub body: String,
}

impl RetryAttempt {
    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(STATUS_UNAUTHORIZED)
    }
}

/// The parts of a response the policy classifies on.
pub trait RetryResponse {
    fn status(&self) -> u16;

    /// Body text carried into a [`RetryAttempt`].
    fn retry_body(&self) -> String;
}

impl RetryResponse for HttpResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn retry_body(&self) -> String {
        self.text()
    }
}

/// Bounded fixed-backoff retry around a single HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `send` until it yields a non-transient outcome or retries run out.
    ///
    /// `before_retry` is awaited between a transient outcome and the backoff
    /// sleep, only when another attempt will follow. Once retries are
    /// exhausted the last outcome is returned as-is.
    pub async fn run<R, S, SFut, H, HFut>(
        &self,
        mut send: S,
        mut before_retry: H,
    ) -> Result<R, ClientError>
    where
        R: RetryResponse,
        S: FnMut() -> SFut,
        SFut: Future<Output = Result<R, ClientError>>,
        H: FnMut(RetryAttempt) -> HFut,
        HFut: Future<Output = ()>,
    {
        let mut retries = 0;
        loop {
            let outcome = send().await;
            let Some(attempt) = self.classify(&outcome, retries + 1) else {
                if retries > 0 {
                    debug!(retries, "request settled after retry");
                }
                return outcome;
            };

            if retries >= self.config.max_retries {
                warn!(
                    retries,
                    status = ?attempt.status,
                    "retries exhausted, returning last outcome"
                );
                return outcome;
            }

            retries += 1;
            warn!(
                retry = retries,
                max_retries = self.config.max_retries,
                status = ?attempt.status,
                "transient failure, retrying"
            );
            before_retry(attempt).await;
            tokio::time::sleep(self.config.backoff).await;
        }
    }

    fn classify<R: RetryResponse>(
        &self,
        outcome: &Result<R, ClientError>,
        retry: u32,
    ) -> Option<RetryAttempt> {
        let (status, body) = match outcome {
            Ok(resp) if is_retryable_status(resp.status()) => {
                (Some(resp.status()), resp.retry_body())
            }
            Err(err) if err.is_transient() => (None, err.to_string()),
            _ => return None,
        };
        Some(RetryAttempt {
            retry,
            max_retries: self.config.max_retries,
            status,
            body,
        })
    }
}
