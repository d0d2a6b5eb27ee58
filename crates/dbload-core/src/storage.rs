//! Staging files for in-flight downloads.
//!
//! Each job writes into its own `<job-id>-XXXX.part` file inside the staging
//! directory. The file is removed when its handle is dropped, unless it was
//! persisted (atomic rename) into its final location first.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Open staging file being filled by a download task.
#[derive(Debug)]
pub struct StagingFile {
    file: File,
    path: TempPath,
    written: u64,
}

impl StagingFile {
    /// Creates a fresh staging file for `job_id` in `staging_dir` (created if missing).
    pub async fn create(staging_dir: &Path, job_id: &str) -> io::Result<Self> {
        tokio::fs::create_dir_all(staging_dir).await?;
        let named = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(staging_dir)?;
        let (file, path) = named.into_parts();
        Ok(StagingFile {
            file: File::from_std(file),
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub async fn write_chunk(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data).await?;
        self.written += data.len() as u64;
        Ok(())
    }

    /// Flushes and syncs the file, then closes it.
    pub async fn finish(mut self) -> io::Result<StagedFile> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        drop(self.file);
        Ok(StagedFile {
            path: self.path,
            len: self.written,
        })
    }
}

/// Complete, closed staging file waiting to be installed.
/// Deleted on drop unless [`StagedFile::persist`] succeeded.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    len: u64,
}

impl StagedFile {
    /// Wraps a temp path produced elsewhere (e.g. an extracted archive member).
    pub fn from_temp_path(path: TempPath, len: u64) -> Self {
        StagedFile { path, len }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Atomically renames the file to `dest`, replacing any existing file.
    pub fn persist(self, dest: &Path) -> io::Result<PathBuf> {
        match self.path.persist(dest) {
            Ok(()) => Ok(dest.to_path_buf()),
            Err(e) => {
                // Staging on another filesystem: copy next to `dest`, then rename.
                tracing::debug!(error = %e.error, "rename failed, copying staged file");
                let dir = dest.parent().unwrap_or_else(|| Path::new("."));
                let copy = tempfile::Builder::new().suffix(TEMP_SUFFIX).tempfile_in(dir)?;
                std::fs::copy(&e.path, copy.path())?;
                copy.as_file().sync_all()?;
                copy.persist(dest).map_err(|e| e.error)?;
                Ok(dest.to_path_buf())
            }
        }
    }
}

/// Deletes `*.part` files left in `staging_dir` by a previous run.
/// Returns how many were removed. A missing directory counts as empty.
pub async fn remove_stale(staging_dir: &Path) -> io::Result<usize> {
    let mut dir = match tokio::fs::read_dir(staging_dir).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        let stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
        if stale && entry.file_type().await?.is_file() {
            tokio::fs::remove_file(&path).await?;
            tracing::debug!(path = %path.display(), "removed stale staging file");
            removed += 1;
        }
    }
    Ok(removed)
}
