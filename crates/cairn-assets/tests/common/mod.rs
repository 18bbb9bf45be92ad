#![forbid(unsafe_code)]
// Each scenario binary compiles its own copy of this module and uses a
// different slice of it.
#![allow(dead_code)]

//! Shared test doubles and fixtures for the cache scenario tests.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use cairn_assets::{
    AssetCache, AssetCacheBuilder, AssetDescriptor, AssetMetadata, ModelFormat, TextureFormat,
};
use cairn_net::{ByteStream, Headers, Net, NetError, RangeSpec};
use parking_lot::Mutex;
use url::Url;

/// Programmable in-memory [`Net`] double.
///
/// Records every fetch start (in order) so tests can assert call counts and
/// cross-asset ordering. Clones share state, mirroring how the cache holds
/// its fetcher while the test keeps a handle for assertions.
#[derive(Clone, Default)]
pub struct TestNet {
    inner: Arc<TestNetInner>,
}

#[derive(Default)]
struct TestNetInner {
    routes: Mutex<HashMap<String, Route>>,
    started: Mutex<Vec<String>>,
    range_starts: Mutex<Vec<(String, u64)>>,
}

#[derive(Clone)]
struct Route {
    body: Bytes,
    /// Fail when opening the stream (HTTP 500).
    fail_open: bool,
    /// Yield this many prefix bytes, then a mid-stream error.
    fail_after: Option<usize>,
    chunk_size: usize,
    open_delay: Duration,
}

impl Default for Route {
    fn default() -> Self {
        Self {
            body: Bytes::new(),
            fail_open: false,
            fail_after: None,
            chunk_size: 8 * 1024,
            open_delay: Duration::ZERO,
        }
    }
}

impl TestNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &Url, body: impl Into<Bytes>) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                body: body.into(),
                ..Route::default()
            },
        );
    }

    pub fn serve_chunked(&self, url: &Url, body: impl Into<Bytes>, chunk_size: usize) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                body: body.into(),
                chunk_size,
                ..Route::default()
            },
        );
    }

    /// Delay stream opening so concurrent callers overlap deterministically.
    pub fn serve_slow(&self, url: &Url, body: impl Into<Bytes>, open_delay: Duration) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                body: body.into(),
                open_delay,
                ..Route::default()
            },
        );
    }

    pub fn fail(&self, url: &Url) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                fail_open: true,
                ..Route::default()
            },
        );
    }

    pub fn fail_slowly(&self, url: &Url, open_delay: Duration) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                fail_open: true,
                open_delay,
                ..Route::default()
            },
        );
    }

    pub fn fail_mid_stream(&self, url: &Url, body: impl Into<Bytes>, good_bytes: usize) {
        self.inner.routes.lock().insert(
            url.to_string(),
            Route {
                body: body.into(),
                fail_after: Some(good_bytes),
                chunk_size: good_bytes.max(1),
                ..Route::default()
            },
        );
    }

    /// Number of network fetches started for this URL (any method).
    pub fn fetches(&self, url: &Url) -> usize {
        let key = url.to_string();
        self.inner.started.lock().iter().filter(|u| **u == key).count()
    }

    /// Every fetch start, in order.
    pub fn started(&self) -> Vec<String> {
        self.inner.started.lock().clone()
    }

    /// Offsets of Range requests issued for this URL.
    pub fn range_starts(&self, url: &Url) -> Vec<u64> {
        let key = url.to_string();
        self.inner
            .range_starts
            .lock()
            .iter()
            .filter(|(u, _)| *u == key)
            .map(|(_, start)| *start)
            .collect()
    }

    fn route(&self, url: &Url) -> Option<Route> {
        self.inner.routes.lock().get(url.as_str()).cloned()
    }

    async fn open(&self, url: &Url, from: u64) -> Result<ByteStream, NetError> {
        self.inner.started.lock().push(url.to_string());
        let Some(route) = self.route(url) else {
            return Err(NetError::http_status(404, url));
        };
        if !route.open_delay.is_zero() {
            tokio::time::sleep(route.open_delay).await;
        }
        if route.fail_open {
            return Err(NetError::http_status(500, url));
        }

        let body = route.body.slice((from as usize).min(route.body.len())..);
        let mut items: Vec<Result<Bytes, NetError>> = body
            .chunks(route.chunk_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if let Some(good) = route.fail_after {
            let keep = good.div_ceil(route.chunk_size.max(1));
            items.truncate(keep);
            items.push(Err(NetError::http("connection reset by test")));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

#[async_trait]
impl Net for TestNet {
    async fn get_bytes(&self, url: Url, _headers: Option<Headers>) -> Result<Bytes, NetError> {
        self.inner.started.lock().push(url.to_string());
        let Some(route) = self.route(&url) else {
            return Err(NetError::http_status(404, &url));
        };
        if route.fail_open {
            return Err(NetError::http_status(500, &url));
        }
        Ok(route.body)
    }

    async fn stream(&self, url: Url, _headers: Option<Headers>) -> Result<ByteStream, NetError> {
        self.open(&url, 0).await
    }

    async fn get_range(
        &self,
        url: Url,
        range: RangeSpec,
        _headers: Option<Headers>,
    ) -> Result<ByteStream, NetError> {
        self.inner
            .range_starts
            .lock()
            .push((url.to_string(), range.start));
        self.open(&url, range.start).await
    }

    async fn head(&self, url: Url, _headers: Option<Headers>) -> Result<Headers, NetError> {
        let Some(route) = self.route(&url) else {
            return Err(NetError::http_status(404, &url));
        };
        let mut headers = Headers::new();
        headers.insert("content-length", route.body.len().to_string());
        Ok(headers)
    }
}

// Fixture helpers

/// Route cache tracing through the test writer; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn asset_url(id: &str) -> Url {
    Url::parse(&format!("https://cdn.test/{id}")).unwrap()
}

/// Model descriptor with its body served by `net`.
pub fn model_asset(net: &TestNet, id: &str, body: &[u8]) -> AssetDescriptor {
    let url = asset_url(id);
    net.serve(&url, Bytes::copy_from_slice(body));
    AssetDescriptor::new(id, url, AssetMetadata::model(ModelFormat::Glb))
        .with_size(body.len() as u64)
}

/// Texture descriptor with its body served by `net`.
pub fn texture_asset(net: &TestNet, id: &str, body: &[u8]) -> AssetDescriptor {
    let url = asset_url(id);
    net.serve(&url, Bytes::copy_from_slice(body));
    AssetDescriptor::new(id, url, AssetMetadata::texture(TextureFormat::Ktx2))
        .with_size(body.len() as u64)
}

pub fn cache_in(dir: &tempfile::TempDir, net: TestNet) -> AssetCache<TestNet> {
    AssetCacheBuilder::new().root_dir(dir.path()).net(net).build()
}

pub fn budgeted_cache_in(
    dir: &tempfile::TempDir,
    net: TestNet,
    max_bytes: u64,
) -> AssetCache<TestNet> {
    AssetCacheBuilder::new()
        .root_dir(dir.path())
        .max_cache_bytes(max_bytes)
        .net(net)
        .build()
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}
