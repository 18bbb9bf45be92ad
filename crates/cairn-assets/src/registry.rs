#![forbid(unsafe_code)]

use std::collections::{HashMap, HashSet};

use crate::{
    asset::{AssetDescriptor, AssetKind, CachePolicy},
    bundle::BundleDescriptor,
};

/// Point-in-time cache counters and sizes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub registered_assets: usize,
    /// Materialized (bytes on disk) assets.
    pub cached_assets: usize,
    pub cache_size_bytes: u64,
    pub max_cache_bytes: Option<u64>,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct Materialized {
    pub rel_path: String,
    pub bytes: u64,
}

pub(crate) struct AssetEntry {
    pub desc: AssetDescriptor,
    pub local: Option<Materialized>,
    /// Logical-clock recency; sole input to eviction ordering.
    pub last_touch: u64,
    /// Registration sequence; breaks recency ties deterministically.
    pub seq: u64,
}

/// Eviction candidate handed to the I/O layer.
#[derive(Clone, Debug)]
pub(crate) struct EvictionCandidate {
    pub id: String,
    pub rel_path: String,
    pub bytes: u64,
}

/// In-memory cache state: asset registry, bundle table, byte accounting,
/// recency clock, counters.
///
/// Separated from the async cache so the selection and accounting logic is
/// testable without storage or a runtime. All mutation happens under the
/// owning cache's lock; nothing here suspends.
pub(crate) struct Registry {
    entries: HashMap<String, AssetEntry>,
    bundles: HashMap<String, BundleDescriptor>,
    clock: u64,
    next_seq: u64,
    current_bytes: u64,
    max_bytes: Option<u64>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Registry {
    pub fn new(max_bytes: Option<u64>) -> Self {
        Self {
            entries: HashMap::new(),
            bundles: HashMap::new(),
            clock: 0,
            next_seq: 0,
            current_bytes: 0,
            max_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Insert or replace asset metadata. Replacing keeps the materialized
    /// state, recency, and registration order of the existing entry.
    pub fn register_asset(&mut self, desc: AssetDescriptor) {
        match self.entries.get_mut(&desc.id) {
            Some(entry) => {
                entry.desc = desc;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.insert(
                    desc.id.clone(),
                    AssetEntry {
                        desc,
                        local: None,
                        last_touch: 0,
                        seq,
                    },
                );
            }
        }
    }

    pub fn register_bundle(&mut self, bundle: BundleDescriptor) {
        self.bundles.insert(bundle.id.clone(), bundle);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn descriptor(&self, id: &str) -> Option<AssetDescriptor> {
        self.entries.get(id).map(|e| e.desc.clone())
    }

    pub fn bundle(&self, id: &str) -> Option<BundleDescriptor> {
        self.bundles.get(id).cloned()
    }

    pub fn local(&self, id: &str) -> Option<Materialized> {
        self.entries.get(id).and_then(|e| e.local.clone())
    }

    /// Mark the asset as most recently used.
    pub fn touch(&mut self, id: &str) {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_touch = self.clock;
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Record a completed, verified download (or a rediscovered file).
    ///
    /// The actual byte count replaces the declared size, and the byte
    /// accounting moves with it in the same mutation.
    pub fn mark_materialized(&mut self, id: &str, rel_path: &str, bytes: u64) {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(id) {
            if let Some(old) = entry.local.take() {
                self.current_bytes = self.current_bytes.saturating_sub(old.bytes);
            }
            entry.local = Some(Materialized {
                rel_path: rel_path.to_string(),
                bytes,
            });
            entry.desc.size_bytes = bytes;
            entry.last_touch = self.clock;
            self.current_bytes = self.current_bytes.saturating_add(bytes);
        }
    }

    /// Drop the materialized state and return the bytes it accounted for.
    ///
    /// Used both by eviction and by repair when a file vanished out-of-band;
    /// the eviction counter is the caller's concern.
    pub fn clear_local(&mut self, id: &str) -> Option<u64> {
        let entry = self.entries.get_mut(id)?;
        let old = entry.local.take()?;
        self.current_bytes = self.current_bytes.saturating_sub(old.bytes);
        Some(old.bytes)
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    /// Whether admitting `incoming` more bytes would exceed the budget.
    pub fn over_budget(&self, incoming: u64) -> bool {
        match self.max_bytes {
            Some(max) => self.current_bytes.saturating_add(incoming) > max,
            None => false,
        }
    }

    /// Least-recently-used evictable asset: materialized, policy other than
    /// `Always`, not in `exclude` (the in-flight set). Ties on recency break
    /// by registration order.
    pub fn next_eviction_candidate(
        &self,
        exclude: &HashSet<String>,
    ) -> Option<EvictionCandidate> {
        self.entries
            .iter()
            .filter(|(id, entry)| {
                entry.local.is_some()
                    && entry.desc.cache_policy != CachePolicy::Always
                    && !exclude.contains(*id)
            })
            .min_by_key(|(_, entry)| (entry.last_touch, entry.seq))
            .map(|(id, entry)| {
                let local = entry.local.as_ref().expect("filtered on local");
                EvictionCandidate {
                    id: id.clone(),
                    rel_path: local.rel_path.clone(),
                    bytes: local.bytes,
                }
            })
    }

    /// Drop every materialized state (any policy) and reset the byte count.
    /// Returns the relative paths that were materialized.
    pub fn clear_all_local(&mut self) -> Vec<String> {
        let mut paths = Vec::new();
        for entry in self.entries.values_mut() {
            if let Some(local) = entry.local.take() {
                paths.push(local.rel_path);
            }
        }
        self.current_bytes = 0;
        paths
    }

    pub fn all_descriptors(&self) -> Vec<AssetDescriptor> {
        self.entries.values().map(|e| e.desc.clone()).collect()
    }

    pub fn assets_by_kind(&self, kind: AssetKind) -> Vec<AssetDescriptor> {
        let mut out: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.desc.kind() == kind)
            .map(|e| e.desc.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Assets carrying every queried tag.
    pub fn assets_by_tags(&self, tags: &[&str]) -> Vec<AssetDescriptor> {
        let mut out: Vec<_> = self
            .entries
            .values()
            .filter(|e| tags.iter().all(|t| e.desc.tags.iter().any(|have| have == t)))
            .map(|e| e.desc.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn stats(&self, in_flight: usize) -> CacheStats {
        CacheStats {
            registered_assets: self.entries.len(),
            cached_assets: self.entries.values().filter(|e| e.local.is_some()).count(),
            cache_size_bytes: self.current_bytes,
            max_cache_bytes: self.max_bytes,
            in_flight,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }
}
