#![forbid(unsafe_code)]

use thiserror::Error;

/// Result type used by `cairn-assets`.
pub type AssetsResult<T> = Result<T, AssetsError>;

/// Asset cache errors.
///
/// `Clone` is load-bearing: concurrent callers of the same in-flight download
/// share one outcome through a shared future, so every variant carries only
/// cloneable payloads (transport causes are captured as messages).
#[derive(Debug, Error, Clone)]
pub enum AssetsError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    #[error("invalid asset id: {0:?}")]
    InvalidId(String),

    #[error("download failed for {id}: {reason}")]
    Download { id: String, reason: String },

    #[error("integrity mismatch for {id}: expected {expected}, got {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("bundle {bundle} failed to load: {source}")]
    Bundle {
        bundle: String,
        #[source]
        source: Box<AssetsError>,
    },

    #[error("bundle dependency cycle through {0}")]
    BundleCycle(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl AssetsError {
    /// Download failure with its transport cause flattened to a message.
    pub fn download(id: &str, cause: impl std::fmt::Display) -> Self {
        Self::Download {
            id: id.to_string(),
            reason: cause.to_string(),
        }
    }

    pub(crate) fn bundle(bundle: &str, source: AssetsError) -> Self {
        Self::Bundle {
            bundle: bundle.to_string(),
            source: Box::new(source),
        }
    }
}
