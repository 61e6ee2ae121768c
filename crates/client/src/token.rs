use std::future::Future;
use std::pin::Pin;

use crate::error::ClientError;

pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ClientError>> + Send + 'a>>;

/// Source of bearer credentials.
///
/// `new_access_token` is called after the service rejects the current token
/// and should mint a fresh one rather than return a cached value.
pub trait TokenProvider: Send + Sync {
    fn access_token(&self) -> TokenFuture<'_>;

    fn new_access_token(&self) -> TokenFuture<'_>;
}

/// Provider that always hands out the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> TokenFuture<'_> {
        Box::pin(async move { Ok(self.token.clone()) })
    }

    fn new_access_token(&self) -> TokenFuture<'_> {
        Box::pin(async move { Ok(self.token.clone()) })
    }
}
