#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;
use tracing::debug;
use url::Url;

use crate::{
    error::NetError,
    traits::{ByteStream, Net},
    types::{Headers, RangeSpec, RetryPolicy},
};

/// Retry decorator for [`Net`] implementations.
///
/// Only errors for which [`NetError::is_retryable`] holds are re-issued.
/// When the retry budget runs out the last error is surfaced wrapped in
/// [`NetError::RetryExhausted`].
pub struct RetryNet<N> {
    inner: N,
    policy: RetryPolicy,
}

impl<N: Net> RetryNet<N> {
    pub fn new(inner: N, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Delay before the next attempt, or `None` when the error must surface.
    fn backoff(&self, error: &NetError, attempt: u32) -> Option<Duration> {
        if attempt >= self.policy.max_retries || !error.is_retryable() {
            return None;
        }
        Some(self.policy.delay_for_attempt(attempt + 1))
    }

    fn surface(&self, error: NetError, attempt: u32) -> NetError {
        if error.is_retryable() && attempt >= self.policy.max_retries {
            NetError::RetryExhausted {
                max_retries: self.policy.max_retries,
                source: Box::new(error),
            }
        } else {
            error
        }
    }
}

#[async_trait]
impl<N: Net> Net for RetryNet<N> {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let mut attempt = 0;
        loop {
            match self.inner.get_bytes(url.clone(), headers.clone()).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => match self.backoff(&error, attempt) {
                    Some(delay) => {
                        debug!(url = %url, attempt, error = %error, "retrying get_bytes");
                        attempt += 1;
                        sleep(delay).await;
                    }
                    None => return Err(self.surface(error, attempt)),
                },
            }
        }
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        // Retries cover opening the stream; chunk errors after that are the
        // consumer's to handle.
        let mut attempt = 0;
        loop {
            match self.inner.stream(url.clone(), headers.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(error) => match self.backoff(&error, attempt) {
                    Some(delay) => {
                        debug!(url = %url, attempt, error = %error, "retrying stream");
                        attempt += 1;
                        sleep(delay).await;
                    }
                    None => return Err(self.surface(error, attempt)),
                },
            }
        }
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let mut attempt = 0;
        loop {
            match self
                .inner
                .get_range(url.clone(), range.clone(), headers.clone())
                .await
            {
                Ok(stream) => return Ok(stream),
                Err(error) => match self.backoff(&error, attempt) {
                    Some(delay) => {
                        debug!(url = %url, attempt, error = %error, "retrying get_range");
                        attempt += 1;
                        sleep(delay).await;
                    }
                    None => return Err(self.surface(error, attempt)),
                },
            }
        }
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        let mut attempt = 0;
        loop {
            match self.inner.head(url.clone(), headers.clone()).await {
                Ok(out) => return Ok(out),
                Err(error) => match self.backoff(&error, attempt) {
                    Some(delay) => {
                        debug!(url = %url, attempt, error = %error, "retrying head");
                        attempt += 1;
                        sleep(delay).await;
                    }
                    None => return Err(self.surface(error, attempt)),
                },
            }
        }
    }
}
