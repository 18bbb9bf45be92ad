#![forbid(unsafe_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::Client;
use tracing::trace;
use url::Url;

use crate::{
    error::NetError,
    traits::{ByteStream, Net},
    types::{Headers, NetOptions, RangeSpec},
};

/// Reqwest-backed [`Net`] implementation.
#[derive(Clone, Debug)]
pub struct HttpClient {
    inner: Client,
    options: NetOptions,
}

impl HttpClient {
    /// # Panics
    ///
    /// Panics if the `reqwest::Client` builder fails to build.
    #[must_use]
    pub fn new(options: NetOptions) -> Self {
        let inner = Client::builder()
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .expect("failed to build reqwest client");
        Self { inner, options }
    }

    fn apply_headers(
        mut req: reqwest::RequestBuilder,
        headers: Option<Headers>,
    ) -> reqwest::RequestBuilder {
        if let Some(headers) = headers {
            for (k, v) in headers.iter() {
                req = req.header(k, v);
            }
        }
        req
    }

    fn check_status(url: &Url, resp: reqwest::Response) -> Result<reqwest::Response, NetError> {
        let status = resp.status();
        if status.is_success() {
            Ok(resp)
        } else {
            Err(NetError::http_status(status.as_u16(), url))
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(NetOptions::default())
    }
}

#[async_trait]
impl Net for HttpClient {
    async fn get_bytes(&self, url: Url, headers: Option<Headers>) -> Result<Bytes, NetError> {
        let req = self.inner.get(url.clone());
        let req = Self::apply_headers(req, headers).timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(NetError::from)?;
        let resp = Self::check_status(&url, resp)?;
        resp.bytes().await.map_err(NetError::from)
    }

    async fn stream(&self, url: Url, headers: Option<Headers>) -> Result<ByteStream, NetError> {
        let req = self.inner.get(url.clone());
        // No timeout for streaming: downloads can take arbitrary time.
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let resp = Self::check_status(&url, resp)?;

        trace!(url = %url, "stream opened");
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        let req = self
            .inner
            .get(url.clone())
            .header("Range", range.to_header_value());
        let req = Self::apply_headers(req, headers);

        let resp = req.send().await.map_err(NetError::from)?;
        let status = resp.status();
        // 206 is the range answer; 200 means the server ignored the range.
        if !(status.is_success() || status.as_u16() == 206) {
            return Err(NetError::http_status(status.as_u16(), &url));
        }

        trace!(url = %url, range = %range.to_header_value(), status = status.as_u16(), "range stream opened");
        let stream = resp.bytes_stream().map_err(NetError::from);
        Ok(Box::pin(stream))
    }

    async fn head(&self, url: Url, headers: Option<Headers>) -> Result<Headers, NetError> {
        let req = self.inner.head(url.clone());
        let req = Self::apply_headers(req, headers).timeout(self.options.request_timeout);

        let resp = req.send().await.map_err(NetError::from)?;
        let resp = Self::check_status(&url, resp)?;

        let mut out = Headers::new();
        for (name, value) in resp.headers() {
            if let Ok(v) = value.to_str() {
                out.insert(name.as_str().to_ascii_lowercase(), v);
            }
        }
        Ok(out)
    }
}
