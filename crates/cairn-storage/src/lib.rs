#![forbid(unsafe_code)]

//! # cairn-storage
//!
//! Disk file store for the cairn asset cache.
//!
//! ## Key mapping (normative)
//!
//! Resources are addressed by relative paths chosen by higher layers; this
//! crate maps them under a root directory and only enforces safety (no
//! absolute paths, no `..`, no empty segments). It does not invent paths.
//!
//! ## Write discipline
//!
//! - Whole-file writes go through [`DiskStore::write_atomic`]: write-temp →
//!   rename, so a target path always holds either the old or the new version,
//!   never a torn write.
//! - Progressive writes go through [`PartialFile`]: an append-only `.part`
//!   sibling that is renamed onto the final path by [`PartialFile::promote`]
//!   only once the caller has verified the content. Anything at the final
//!   path is therefore complete and verified.

mod disk;
mod error;
mod partial;

pub use disk::DiskStore;
pub use error::{StorageError, StorageResult};
pub use partial::PartialFile;
