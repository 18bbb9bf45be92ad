#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Append-only staging file for a progressive download.
///
/// Bytes accumulate at `<final>.part`; [`promote`](Self::promote) renames the
/// staging file onto the final path once the caller has verified the content.
/// Re-opening an existing `.part` resumes at its current length.
pub struct PartialFile {
    final_path: PathBuf,
    part_path: PathBuf,
    file: tokio::fs::File,
    len: u64,
    cancel: CancellationToken,
}

impl PartialFile {
    pub(crate) async fn open(
        final_path: PathBuf,
        cancel: CancellationToken,
    ) -> StorageResult<Self> {
        let part_path = part_path_for(&final_path);
        if let Some(parent) = part_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&part_path)
            .await?;
        let len = file.metadata().await?.len();

        Ok(Self {
            final_path,
            part_path,
            file,
            len,
            cancel,
        })
    }

    /// Bytes already staged (resume offset).
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Read the staged prefix, for re-hashing a resumed download.
    pub async fn read_existing(&self) -> StorageResult<Bytes> {
        let data = tokio::fs::read(&self.part_path).await?;
        Ok(Bytes::from(data))
    }

    pub async fn append(&mut self, chunk: &[u8]) -> StorageResult<()> {
        if self.cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }
        self.file.write_all(chunk).await?;
        // Flush per chunk: a later resume trusts the on-disk length even when
        // this handle is dropped mid-download.
        self.file.flush().await?;
        self.len += chunk.len() as u64;
        Ok(())
    }

    /// Flush and rename onto the final path. Returns the final length.
    pub async fn promote(mut self) -> StorageResult<u64> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);

        tokio::fs::rename(&self.part_path, &self.final_path).await?;
        debug!(path = %self.final_path.display(), len = self.len, "partial file promoted");
        Ok(self.len)
    }

    /// Delete the staging file without touching the final path.
    pub async fn discard(self) -> StorageResult<()> {
        drop(self.file);
        match tokio::fs::remove_file(&self.part_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Staging sibling for a final path: `model.glb` → `model.glb.part`.
pub(crate) fn part_path_for(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}
