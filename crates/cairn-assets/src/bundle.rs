#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::asset::AssetDescriptor;

/// Named group of assets with explicit load-ordering dependencies on other
/// bundles.
///
/// Dependency bundles are fully loaded (depth-first) before any asset
/// exclusive to this bundle starts downloading.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleDescriptor {
    pub id: String,
    pub assets: Vec<AssetDescriptor>,
    /// Bundle ids that must be fully loaded first.
    pub dependencies: Vec<String>,
}

impl BundleDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assets: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_assets<I>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = AssetDescriptor>,
    {
        self.assets = assets.into_iter().collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sum of the declared sizes of member assets.
    pub fn total_size_bytes(&self) -> u64 {
        self.assets
            .iter()
            .fold(0u64, |acc, a| acc.saturating_add(a.size_bytes))
    }
}
