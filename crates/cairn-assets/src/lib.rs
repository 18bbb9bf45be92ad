#![forbid(unsafe_code)]

//! # cairn-assets
//!
//! Asset cache manager for streamed AR/3D content.
//!
//! An [`AssetCache`] owns a registry of remote assets (models, textures,
//! animations, audio, video) and materializes their bytes on demand into a
//! disk cache with a soft byte budget.
//!
//! ## Contract (normative)
//!
//! - **De-duplication**: concurrent loads of one asset share a single
//!   download; every caller observes the same outcome.
//! - **Eviction**: least-recently-used first, recency measured by a logical
//!   clock over successful loads/hits, ties broken by registration order.
//!   `Always`-policy and in-flight assets are never evicted. The byte budget
//!   is a soft target: a download proceeds even when nothing evictable
//!   remains.
//! - **Paths**: an asset's local path is `<root>/<id>.<ext>`, deterministic
//!   and stable across restarts; bytes found there from a previous run are
//!   adopted without a download (except for `Never`-policy assets).
//! - **Integrity**: a declared SHA-256 is verified before the staging file is
//!   renamed into place, so anything at a final path is complete and
//!   verified; a mismatch discards the staged bytes and surfaces
//!   [`AssetsError::Integrity`].
//! - **No automatic retry**: failures surface to the caller; only
//!   [`AssetCache::preload_assets`] is best-effort. A mid-stream failure
//!   keeps the staged prefix, and the next load resumes it with a Range
//!   request.
//!
//! The network and disk seams live in the `cairn-net` and `cairn-storage`
//! crates; any [`cairn_net::Net`] implementation can be injected via
//! [`AssetCacheBuilder::net`].

mod asset;
mod bundle;
mod cache;
mod error;
mod path;
mod registry;

pub use asset::{
    AssetDescriptor, AssetKind, AssetMetadata, AudioFormat, CachePolicy, LoadPriority, ModelFormat,
    TextureFormat, VideoFormat,
};
pub use bundle::BundleDescriptor;
pub use cache::{AssetCache, AssetCacheBuilder, ProgressFn};
pub use error::{AssetsError, AssetsResult};
pub use registry::CacheStats;
