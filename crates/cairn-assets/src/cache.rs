#![forbid(unsafe_code)]

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use cairn_net::{HttpClient, Net, RangeSpec};
use cairn_storage::DiskStore;
use futures::{
    FutureExt, StreamExt,
    future::{BoxFuture, Shared, join_all, try_join_all},
};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    asset::{AssetDescriptor, AssetKind, CachePolicy, LoadPriority},
    bundle::BundleDescriptor,
    error::{AssetsError, AssetsResult},
    path::{local_rel_path, validate_id},
    registry::{CacheStats, Registry},
};

/// Download progress callback. Receives monotonically non-decreasing
/// fractions in `[0, 1]`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Shared handle to an in-flight download. Every concurrent requester of the
/// same asset awaits one of these; the underlying task runs exactly once.
type PendingLoad = Shared<BoxFuture<'static, AssetsResult<PathBuf>>>;

struct Inner<N> {
    store: DiskStore,
    net: N,
    registry: Mutex<Registry>,
    pending: Mutex<HashMap<String, PendingLoad>>,
    cancel: CancellationToken,
}

/// Asset cache manager.
///
/// Owns the asset/bundle registry and a disk-rooted byte cache. Any asset's
/// bytes are made available locally on demand; concurrent requests for one
/// asset share a single download, and a soft byte budget is enforced by
/// least-recently-used eviction.
///
/// Cheap to clone; clones share all state.
pub struct AssetCache<N = HttpClient> {
    inner: Arc<Inner<N>>,
}

impl<N> Clone for AssetCache<N> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Constructor for [`AssetCache`].
///
/// ```ignore
/// let cache = AssetCacheBuilder::new()
///     .root_dir("/var/cache/cairn")
///     .max_cache_bytes(256 * 1024 * 1024)
///     .build();
/// ```
pub struct AssetCacheBuilder<N = HttpClient> {
    root_dir: Option<PathBuf>,
    max_cache_bytes: Option<u64>,
    cancel: Option<CancellationToken>,
    net: N,
}

impl AssetCacheBuilder<HttpClient> {
    pub fn new() -> Self {
        Self {
            root_dir: None,
            max_cache_bytes: None,
            cancel: None,
            net: HttpClient::default(),
        }
    }
}

impl Default for AssetCacheBuilder<HttpClient> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Net + 'static> AssetCacheBuilder<N> {
    /// Directory holding materialized assets.
    pub fn root_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(root.into());
        self
    }

    /// Soft byte budget. Eviction targets this ceiling but a download
    /// proceeds even when nothing evictable remains.
    pub fn max_cache_bytes(mut self, max: u64) -> Self {
        self.max_cache_bytes = Some(max);
        self
    }

    /// Process-shutdown token. There is no per-download cancellation.
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Swap the network fetcher (any [`Net`] implementation).
    pub fn net<M: Net + 'static>(self, net: M) -> AssetCacheBuilder<M> {
        AssetCacheBuilder {
            root_dir: self.root_dir,
            max_cache_bytes: self.max_cache_bytes,
            cancel: self.cancel,
            net,
        }
    }

    pub fn build(self) -> AssetCache<N> {
        let root = self
            .root_dir
            .unwrap_or_else(|| std::env::temp_dir().join("cairn"));
        let cancel = self.cancel.unwrap_or_default();

        AssetCache {
            inner: Arc::new(Inner {
                store: DiskStore::new(root, cancel.clone()),
                net: self.net,
                registry: Mutex::new(Registry::new(self.max_cache_bytes)),
                pending: Mutex::new(HashMap::new()),
                cancel,
            }),
        }
    }
}

impl<N: Net + 'static> AssetCache<N> {
    pub fn builder() -> AssetCacheBuilder<HttpClient> {
        AssetCacheBuilder::new()
    }

    pub fn root_dir(&self) -> &Path {
        self.inner.store.root_dir()
    }

    // Registration

    /// Insert or replace asset metadata by id. No I/O; idempotent.
    pub fn register_asset(&self, desc: AssetDescriptor) -> AssetsResult<()> {
        validate_id(&desc.id)?;
        self.inner.registry.lock().register_asset(desc);
        Ok(())
    }

    /// Register a bundle and all of its member assets.
    pub fn register_bundle(&self, bundle: BundleDescriptor) -> AssetsResult<()> {
        if bundle.id.is_empty() {
            return Err(AssetsError::InvalidId(bundle.id));
        }
        for asset in &bundle.assets {
            validate_id(&asset.id)?;
        }
        let mut registry = self.inner.registry.lock();
        for asset in &bundle.assets {
            registry.register_asset(asset.clone());
        }
        registry.register_bundle(bundle);
        Ok(())
    }

    // Loading

    /// Make the asset's bytes available locally and return their path.
    ///
    /// Cache hits touch recency and return without network I/O. A call for
    /// an id that is already downloading awaits the existing download and
    /// observes its outcome; exactly one request hits the network.
    pub async fn load_asset(&self, id: &str) -> AssetsResult<PathBuf> {
        self.load_inner(id, None).await
    }

    /// Same contract as [`load_asset`](Self::load_asset), reporting progress
    /// as bytes arrive. A pre-existing `.part` prefix is resumed with a
    /// Range request. Callers that hit the cache or join an in-flight
    /// download observe a single final `1.0`.
    pub async fn stream_asset(&self, id: &str, on_progress: ProgressFn) -> AssetsResult<PathBuf> {
        self.load_inner(id, Some(on_progress)).await
    }

    async fn load_inner(&self, id: &str, progress: Option<ProgressFn>) -> AssetsResult<PathBuf> {
        let inner = &self.inner;

        let (desc, local) = {
            let registry = inner.registry.lock();
            let Some(desc) = registry.descriptor(id) else {
                return Err(AssetsError::NotFound(id.to_string()));
            };
            (desc, registry.local(id))
        };
        let rel = local_rel_path(&desc.id, desc.metadata.extension());

        if let Some(local) = local {
            let present = inner
                .store
                .exists(&local.rel_path)
                .await
                .map_err(|e| AssetsError::download(id, e))?;
            if present {
                let path = inner
                    .store
                    .resolve(&local.rel_path)
                    .map_err(|e| AssetsError::download(id, e))?;
                {
                    let mut registry = inner.registry.lock();
                    registry.touch(id);
                    registry.record_hit();
                }
                debug!(id, "cache hit");
                if let Some(cb) = &progress {
                    cb(1.0);
                }
                return Ok(path);
            }
            // File vanished out-of-band; repair accounting and fall through.
            warn!(id, "materialized file missing on disk, treating as miss");
            inner.registry.lock().clear_local(id);
        } else if desc.cache_policy != CachePolicy::Never {
            // Deterministic paths survive restarts: adopt bytes from a
            // previous run without re-downloading.
            let existing = inner
                .store
                .len(&rel)
                .await
                .map_err(|e| AssetsError::download(id, e))?;
            if let Some(bytes) = existing {
                let path = inner
                    .store
                    .resolve(&rel)
                    .map_err(|e| AssetsError::download(id, e))?;
                {
                    let mut registry = inner.registry.lock();
                    registry.mark_materialized(id, &rel, bytes);
                    registry.record_hit();
                }
                debug!(id, bytes, "rediscovered materialized asset");
                if let Some(cb) = &progress {
                    cb(1.0);
                }
                return Ok(path);
            }
        }

        let (load, joined) = {
            let mut pending = inner.pending.lock();
            match pending.get(id) {
                Some(existing) => (existing.clone(), true),
                None => {
                    inner.registry.lock().record_miss();
                    let load = self.spawn_download(desc, rel, progress.clone());
                    pending.insert(id.to_string(), load.clone());
                    (load, false)
                }
            }
        };

        if joined {
            debug!(id, "joining in-flight download");
        }
        let result = load.await;
        if joined && result.is_ok() {
            if let Some(cb) = &progress {
                cb(1.0);
            }
        }
        result
    }

    /// Spawn the download as a detached task so it completes even if every
    /// interested caller goes away, and hand back a shareable result handle.
    fn spawn_download(
        &self,
        desc: AssetDescriptor,
        rel: String,
        progress: Option<ProgressFn>,
    ) -> PendingLoad {
        let id = desc.id.clone();
        let task_inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let result = download_and_materialize(&task_inner, &desc, &rel, progress).await;
            task_inner.pending.lock().remove(&desc.id);
            if let Err(error) = &result {
                debug!(id = %desc.id, %error, "download failed");
            }
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(AssetsError::Download {
                    id,
                    reason: format!("download task aborted: {e}"),
                }),
            }
        }
        .boxed()
        .shared()
    }

    // Bundles

    /// Load a bundle: dependency bundles first (depth-first, each fully
    /// loaded before the next sibling), then the bundle's own assets
    /// concurrently.
    ///
    /// Fail-fast: the first member failure is returned, wrapped with the
    /// bundle id. Sibling downloads already started keep running in the
    /// background and may still populate the cache.
    pub async fn load_bundle(&self, id: &str) -> AssetsResult<()> {
        let mut walk = BundleWalk::default();
        self.load_bundle_rec(id, &mut walk).await
    }

    fn load_bundle_rec<'a>(
        &'a self,
        id: &'a str,
        walk: &'a mut BundleWalk,
    ) -> BoxFuture<'a, AssetsResult<()>> {
        async move {
            if walk.done.contains(id) {
                return Ok(());
            }
            if !walk.stack.insert(id.to_string()) {
                return Err(AssetsError::BundleCycle(id.to_string()));
            }

            let Some(bundle) = self.inner.registry.lock().bundle(id) else {
                return Err(AssetsError::BundleNotFound(id.to_string()));
            };

            for dep in &bundle.dependencies {
                self.load_bundle_rec(dep, walk).await?;
            }

            debug!(bundle = id, assets = bundle.assets.len(), "loading bundle assets");
            try_join_all(bundle.assets.iter().map(|a| self.load_asset(&a.id)))
                .await
                .map_err(|e| AssetsError::bundle(id, e))?;

            walk.stack.remove(id);
            walk.done.insert(id.to_string());
            Ok(())
        }
        .boxed()
    }

    // Preloading

    /// Warm the cache in two awaited waves: all `High` ids concurrently,
    /// then all `Medium` ids. `Low` ids load on demand only. Best-effort:
    /// failures and unknown ids are logged, never propagated.
    pub async fn preload_assets(&self, ids: &[&str]) {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        {
            let registry = self.inner.registry.lock();
            for id in ids {
                match registry.descriptor(id) {
                    None => warn!(id = %id, "preload skipped: unknown asset"),
                    Some(desc) => match desc.priority {
                        LoadPriority::High => high.push(desc.id),
                        LoadPriority::Medium => medium.push(desc.id),
                        LoadPriority::Low => {
                            trace!(id = %id, "preload skipped: low priority loads on demand");
                        }
                    },
                }
            }
        }

        for (wave, ids) in [("high", high), ("medium", medium)] {
            if ids.is_empty() {
                continue;
            }
            debug!(wave, count = ids.len(), "preload wave");
            let results = join_all(ids.iter().map(|id| self.load_asset(id))).await;
            for (id, result) in ids.iter().zip(results) {
                if let Err(error) = result {
                    warn!(id = %id, %error, "preload failed");
                }
            }
        }
    }

    // Eviction

    /// Free least-recently-used evictable bytes until `target_freed_bytes`
    /// is met or candidates run out. `Always`-policy and in-flight assets
    /// are never touched. Never fails; returns the bytes actually freed.
    pub async fn evict(&self, target_freed_bytes: u64) -> u64 {
        let mut freed = 0u64;
        while freed < target_freed_bytes {
            let Some(candidate) = self.take_eviction_candidate() else {
                break;
            };
            freed = freed.saturating_add(candidate.bytes);
            debug!(id = %candidate.id, bytes = candidate.bytes, freed, "evicting");
            if let Err(error) = self.inner.store.delete(&candidate.rel_path).await {
                warn!(id = %candidate.id, %error, "eviction delete failed");
            }
        }
        freed
    }

    /// Pick, un-account, and return the next eviction candidate. Accounting
    /// changes under the lock so concurrent passes cannot double-free.
    fn take_eviction_candidate(&self) -> Option<crate::registry::EvictionCandidate> {
        let in_flight: HashSet<String> = self.inner.pending.lock().keys().cloned().collect();
        let mut registry = self.inner.registry.lock();
        let candidate = registry.next_eviction_candidate(&in_flight)?;
        registry.clear_local(&candidate.id);
        registry.record_eviction();
        Some(candidate)
    }

    /// Delete every materialized file regardless of policy, plus staging
    /// files, and reset accounting. Explicit user-triggered reset only;
    /// in-flight downloads are not stopped and will re-materialize.
    pub async fn clear_cache(&self) {
        let (materialized, descriptors) = {
            let mut registry = self.inner.registry.lock();
            (registry.clear_all_local(), registry.all_descriptors())
        };

        for rel in &materialized {
            if let Err(error) = self.inner.store.delete(rel).await {
                warn!(rel = %rel, %error, "clear_cache delete failed");
            }
        }
        for desc in &descriptors {
            let part_rel = format!(
                "{}.part",
                local_rel_path(&desc.id, desc.metadata.extension())
            );
            if let Err(error) = self.inner.store.delete(&part_rel).await {
                warn!(rel = %part_rel, %error, "clear_cache staging delete failed");
            }
        }
        debug!(files = materialized.len(), "cache cleared");
    }

    // Queries (pure reads)

    pub fn asset(&self, id: &str) -> Option<AssetDescriptor> {
        self.inner.registry.lock().descriptor(id)
    }

    /// Absolute path of a materialized asset, if any.
    pub fn local_path(&self, id: &str) -> Option<PathBuf> {
        let local = self.inner.registry.lock().local(id)?;
        self.inner.store.resolve(&local.rel_path).ok()
    }

    pub fn assets_by_kind(&self, kind: AssetKind) -> Vec<AssetDescriptor> {
        self.inner.registry.lock().assets_by_kind(kind)
    }

    /// Assets carrying every queried tag.
    pub fn assets_by_tags(&self, tags: &[&str]) -> Vec<AssetDescriptor> {
        self.inner.registry.lock().assets_by_tags(tags)
    }

    pub fn stats(&self) -> CacheStats {
        let in_flight = self.inner.pending.lock().len();
        self.inner.registry.lock().stats(in_flight)
    }
}

#[derive(Default)]
struct BundleWalk {
    done: HashSet<String>,
    stack: HashSet<String>,
}

/// Evict until `incoming` more bytes fit the budget, then stream the asset
/// into its staging file, verify, promote, and account for it.
async fn download_and_materialize<N: Net>(
    inner: &Inner<N>,
    desc: &AssetDescriptor,
    rel: &str,
    progress: Option<ProgressFn>,
) -> AssetsResult<PathBuf> {
    let id = desc.id.as_str();

    evict_until_fits(inner, desc.size_bytes).await;

    let mut part = inner
        .store
        .open_partial(rel)
        .await
        .map_err(|e| AssetsError::download(id, e))?;

    let mut hasher = Sha256::new();
    let resume_from = part.len();
    if resume_from > 0 {
        // The staged prefix counts toward the content hash.
        let existing = part
            .read_existing()
            .await
            .map_err(|e| AssetsError::download(id, e))?;
        hasher.update(&existing);
        debug!(id, offset = resume_from, "resuming partial download");
    }

    let total = if desc.size_bytes > 0 {
        Some(desc.size_bytes)
    } else if progress.is_some() {
        probe_content_length(inner, desc).await
    } else {
        None
    };
    let mut reporter = ProgressReporter::new(progress, total);
    reporter.report(resume_from);

    let mut stream = if resume_from > 0 {
        inner
            .net
            .get_range(
                desc.source_url.clone(),
                RangeSpec::from_start(resume_from),
                None,
            )
            .await
    } else {
        inner.net.stream(desc.source_url.clone(), None).await
    }
    .map_err(|e| AssetsError::download(id, e))?;

    let mut received = resume_from;
    loop {
        let next = tokio::select! {
            biased;

            () = inner.cancel.cancelled() => {
                debug!(id, offset = received, "download cancelled");
                return Err(AssetsError::Cancelled);
            }

            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };

        // A mid-stream failure keeps the staged prefix for a later resume.
        let bytes = chunk.map_err(|e| AssetsError::download(id, e))?;
        if bytes.is_empty() {
            continue;
        }
        part.append(&bytes)
            .await
            .map_err(|e| AssetsError::download(id, e))?;
        hasher.update(&bytes);
        received += bytes.len() as u64;
        reporter.report(received);
    }

    if received == 0 {
        let _ = part.discard().await;
        return Err(AssetsError::download(id, "empty response body"));
    }

    if let Some(expected) = &desc.integrity {
        let actual = hex::encode(hasher.finalize());
        if !expected.eq_ignore_ascii_case(&actual) {
            // Corrupt bytes must not survive to seed a resume.
            let _ = part.discard().await;
            return Err(AssetsError::Integrity {
                id: id.to_string(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    let final_len = part
        .promote()
        .await
        .map_err(|e| AssetsError::download(id, e))?;
    reporter.finish();

    let path = inner
        .store
        .resolve(rel)
        .map_err(|e| AssetsError::download(id, e))?;
    inner.registry.lock().mark_materialized(id, rel, final_len);

    debug!(id, bytes = final_len, path = %path.display(), "asset materialized");
    Ok(path)
}

/// Creation-time eviction: least-recently-used evictable assets go until the
/// incoming size fits. The budget is a soft target; running out of
/// candidates is not an error.
async fn evict_until_fits<N: Net>(inner: &Inner<N>, incoming: u64) {
    loop {
        let in_flight: HashSet<String> = inner.pending.lock().keys().cloned().collect();
        let candidate = {
            let mut registry = inner.registry.lock();
            if !registry.over_budget(incoming) {
                return;
            }
            match registry.next_eviction_candidate(&in_flight) {
                Some(candidate) => {
                    registry.clear_local(&candidate.id);
                    registry.record_eviction();
                    Some(candidate)
                }
                None => None,
            }
        };

        let Some(candidate) = candidate else {
            debug!(incoming, "over budget with no evictable candidates, proceeding");
            return;
        };
        debug!(id = %candidate.id, bytes = candidate.bytes, "evicting for incoming download");
        if let Err(error) = inner.store.delete(&candidate.rel_path).await {
            warn!(id = %candidate.id, %error, "eviction delete failed");
        }
    }
}

async fn probe_content_length<N: Net>(inner: &Inner<N>, desc: &AssetDescriptor) -> Option<u64> {
    match inner.net.head(desc.source_url.clone(), None).await {
        Ok(headers) => headers.get("content-length").and_then(|v| v.parse().ok()),
        Err(error) => {
            trace!(id = %desc.id, %error, "content-length probe failed");
            None
        }
    }
}

/// Clamps progress to `[0, 1]` and never goes backwards, whatever the
/// declared size turns out to be worth.
struct ProgressReporter {
    cb: Option<ProgressFn>,
    total: Option<u64>,
    last: f64,
}

impl ProgressReporter {
    fn new(cb: Option<ProgressFn>, total: Option<u64>) -> Self {
        Self {
            cb,
            total: total.filter(|t| *t > 0),
            last: 0.0,
        }
    }

    fn report(&mut self, received: u64) {
        let (Some(cb), Some(total)) = (&self.cb, self.total) else {
            return;
        };
        let fraction = (received as f64 / total as f64).clamp(0.0, 1.0);
        if fraction > self.last {
            self.last = fraction;
            cb(fraction);
        }
    }

    fn finish(&mut self) {
        if let Some(cb) = &self.cb {
            if self.last < 1.0 {
                self.last = 1.0;
                cb(1.0);
            }
        }
    }
}
