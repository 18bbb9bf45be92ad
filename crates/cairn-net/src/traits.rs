#![forbid(unsafe_code)]

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use crate::{
    error::NetError,
    retry::RetryNet,
    timeout::TimeoutNet,
    types::{Headers, RangeSpec, RetryPolicy},
};

/// Chunked response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, NetError>> + Send>>;

/// Fetch contract consumed by the asset cache.
///
/// Implementations must be cheaply cloneable or shareable behind `Arc`;
/// the cache issues calls from many concurrent tasks.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Fetch the whole body. The request timeout applies.
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError>;

    /// Stream the body in chunks. No overall timeout: downloads take
    /// arbitrary time.
    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError>;

    /// Stream a byte range. Servers answering 200 (range ignored) are
    /// accepted alongside 206.
    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError>;

    /// Issue a HEAD request and return the response headers, lowercased.
    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError>;
}

/// Decorator hooks for any [`Net`] implementation.
pub trait NetExt: Net + Sized {
    fn with_timeout(self, timeout: Duration) -> TimeoutNet<Self> {
        TimeoutNet::new(self, timeout)
    }

    fn with_retry(self, policy: RetryPolicy) -> RetryNet<Self> {
        RetryNet::new(self, policy)
    }
}

impl<T: Net> NetExt for T {}
