#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use url::Url;

/// Coarse asset classification, derived from [`AssetMetadata`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Model,
    Texture,
    Animation,
    Audio,
    Video,
}

/// Eviction policy for a materialized asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Never evicted.
    Always,
    /// Evictable once recency makes it a candidate.
    #[default]
    Session,
    /// Evictable like `Session`, and its on-disk bytes are not trusted across
    /// process restarts (no rediscovery).
    Never,
}

/// Preload ordering. Has no influence on eviction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
    Usdz,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureFormat {
    Png,
    Jpeg,
    Ktx2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    Mp3,
    Ogg,
    Wav,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoFormat {
    Mp4,
    Webm,
}

/// Per-kind metadata. The variant fixes the asset's [`AssetKind`] and its
/// on-disk file extension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetMetadata {
    Model {
        format: ModelFormat,
        triangle_count: Option<u64>,
    },
    Texture {
        format: TextureFormat,
        width: Option<u32>,
        height: Option<u32>,
    },
    Animation {
        duration_secs: Option<f32>,
    },
    Audio {
        format: AudioFormat,
        duration_secs: Option<f32>,
    },
    Video {
        format: VideoFormat,
        width: Option<u32>,
        height: Option<u32>,
        duration_secs: Option<f32>,
    },
}

impl AssetMetadata {
    pub fn model(format: ModelFormat) -> Self {
        Self::Model {
            format,
            triangle_count: None,
        }
    }

    pub fn texture(format: TextureFormat) -> Self {
        Self::Texture {
            format,
            width: None,
            height: None,
        }
    }

    pub fn animation() -> Self {
        Self::Animation {
            duration_secs: None,
        }
    }

    pub fn audio(format: AudioFormat) -> Self {
        Self::Audio {
            format,
            duration_secs: None,
        }
    }

    pub fn video(format: VideoFormat) -> Self {
        Self::Video {
            format,
            width: None,
            height: None,
            duration_secs: None,
        }
    }

    pub fn kind(&self) -> AssetKind {
        match self {
            Self::Model { .. } => AssetKind::Model,
            Self::Texture { .. } => AssetKind::Texture,
            Self::Animation { .. } => AssetKind::Animation,
            Self::Audio { .. } => AssetKind::Audio,
            Self::Video { .. } => AssetKind::Video,
        }
    }

    /// File extension for the deterministic local path.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Model { format, .. } => match format {
                ModelFormat::Gltf => "gltf",
                ModelFormat::Glb => "glb",
                ModelFormat::Obj => "obj",
                ModelFormat::Usdz => "usdz",
            },
            Self::Texture { format, .. } => match format {
                TextureFormat::Png => "png",
                TextureFormat::Jpeg => "jpg",
                TextureFormat::Ktx2 => "ktx2",
            },
            Self::Animation { .. } => "anim",
            Self::Audio { format, .. } => match format {
                AudioFormat::Mp3 => "mp3",
                AudioFormat::Ogg => "ogg",
                AudioFormat::Wav => "wav",
            },
            Self::Video { format, .. } => match format {
                VideoFormat::Mp4 => "mp4",
                VideoFormat::Webm => "webm",
            },
        }
    }
}

/// Everything the cache needs to know about one remote asset.
///
/// Registration carries metadata only; bytes move on first load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssetDescriptor {
    pub id: String,
    pub source_url: Url,
    pub metadata: AssetMetadata,
    /// Declared size used for budget accounting; replaced by the actual byte
    /// count once a download completes.
    pub size_bytes: u64,
    /// Expected SHA-256 of the complete content, lowercase hex.
    pub integrity: Option<String>,
    /// Informational links to other asset ids. Load ordering lives on
    /// bundles, not here.
    pub dependencies: Vec<String>,
    pub cache_policy: CachePolicy,
    pub priority: LoadPriority,
    pub tags: Vec<String>,
}

impl AssetDescriptor {
    pub fn new(id: impl Into<String>, source_url: Url, metadata: AssetMetadata) -> Self {
        Self {
            id: id.into(),
            source_url,
            metadata,
            size_bytes: 0,
            integrity: None,
            dependencies: Vec::new(),
            cache_policy: CachePolicy::default(),
            priority: LoadPriority::default(),
            tags: Vec::new(),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.metadata.kind()
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn with_integrity(mut self, sha256_hex: impl Into<String>) -> Self {
        self.integrity = Some(sha256_hex.into().to_ascii_lowercase());
        self
    }

    pub fn with_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_priority(mut self, priority: LoadPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
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
}
