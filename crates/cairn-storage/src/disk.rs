#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{StorageError, StorageResult},
    partial::PartialFile,
};

/// Disk-rooted file store.
///
/// Maps validated relative paths to `<root>/<rel>`. All operations check the
/// shared cancellation token before touching disk. Deletion of a missing file
/// is not an error.
#[derive(Clone, Debug)]
pub struct DiskStore {
    root: PathBuf,
    cancel: CancellationToken,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            root: root.into(),
            cancel,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a validated relative path.
    pub fn resolve(&self, rel: &str) -> StorageResult<PathBuf> {
        let safe = sanitize(rel)?;
        Ok(self.root.join(safe))
    }

    fn guard(&self) -> StorageResult<()> {
        if self.cancel.is_cancelled() {
            Err(StorageError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub async fn exists(&self, rel: &str) -> StorageResult<bool> {
        self.guard()?;
        let path = self.resolve(rel)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }

    /// Byte length of the file, or `None` when absent.
    pub async fn len(&self, rel: &str) -> StorageResult<Option<u64>> {
        self.guard()?;
        let path = self.resolve(rel)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, rel: &str) -> StorageResult<Bytes> {
        self.guard()?;
        let path = self.resolve(rel)?;
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    /// Crash-safe whole-file write: temp file in the target directory, then
    /// atomic rename. The target is never observable half-written.
    pub async fn write_atomic(&self, rel: &str, data: Bytes) -> StorageResult<()> {
        self.guard()?;
        let path = self.resolve(rel)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::Failed("atomic write: no parent dir".to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent).await?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
            std::io::Write::write_all(&mut tmp, &data)?;
            tmp.persist(&target)
                .map_err(|e| StorageError::Failed(format!("atomic rename: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Failed(format!("atomic write task: {e}")))??;

        debug!(rel, "atomic write committed");
        Ok(())
    }

    /// Delete the file at `rel`. Missing files are fine.
    pub async fn delete(&self, rel: &str) -> StorageResult<()> {
        self.guard()?;
        let path = self.resolve(rel)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(rel, "deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Open (or re-open) the `.part` staging file for `rel`.
    pub async fn open_partial(&self, rel: &str) -> StorageResult<PartialFile> {
        self.guard()?;
        let final_path = self.resolve(rel)?;
        PartialFile::open(final_path, self.cancel.clone()).await
    }

    /// Remove the whole root directory. Used for explicit cache reset.
    pub async fn remove_root(&self) -> StorageResult<()> {
        self.guard()?;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Validate a caller-supplied relative path.
///
/// Backslashes are normalized to `/`. Absolute paths, `..`, and empty
/// segments are rejected.
pub(crate) fn sanitize(input: &str) -> StorageResult<String> {
    let s = input.replace('\\', "/");
    if s.is_empty() || s.starts_with('/') || s.split('/').any(|seg| seg.is_empty() || seg == "..") {
        return Err(StorageError::InvalidPath(input.to_string()));
    }
    Ok(s)
}
