//! Background download task.
//!
//! One task per job: open the remote stream, append every chunk to a private
//! staging file while counting bytes into the job's progress, then hand the
//! staged file to the installer. The outcome is only ever reported through
//! the job record; nothing is returned to the request that spawned it.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::fetch::{Fetcher, TransferError};
use crate::install::{InstallError, Installer};
use crate::job::JobProgress;
use crate::storage::StagingFile;

/// Collaborators shared by every download task.
#[derive(Clone)]
pub struct TaskContext {
    pub fetcher: Arc<dyn Fetcher>,
    pub installer: Arc<dyn Installer>,
    pub staging_dir: PathBuf,
}

impl TaskContext {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        installer: Arc<dyn Installer>,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            installer,
            staging_dir: staging_dir.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Install(#[from] InstallError),
}

/// Starts the download for a freshly created job and returns immediately.
pub fn spawn_download(
    ctx: TaskContext,
    url: String,
    name: String,
    progress: JobProgress,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = run_download(&ctx, &url, &name, &progress).await;
        match &outcome {
            Ok(path) => tracing::info!(
                job_id = progress.id(),
                name = %name,
                bytes = progress.done_bytes(),
                path = %path.display(),
                "load complete"
            ),
            Err(e) => tracing::warn!(
                job_id = progress.id(),
                url = %url,
                bytes = progress.done_bytes(),
                "load failed: {}",
                e
            ),
        }
        progress.finish(outcome.map(|_| ()).map_err(|e| e.to_string()));
    })
}

/// Fetches `url` into staging and installs it as `name`.
///
/// Any staged bytes are deleted on every error path (the staging handles
/// remove their file when dropped).
pub async fn run_download(
    ctx: &TaskContext,
    url: &str,
    name: &str,
    progress: &JobProgress,
) -> Result<PathBuf, DownloadError> {
    let job_id = progress.id();
    let mut staging = StagingFile::create(&ctx.staging_dir, job_id)
        .await
        .map_err(TransferError::Storage)?;

    let mut stream = ctx.fetcher.open(url);
    let declared = stream.open().await?;
    if let Some(total) = declared {
        progress.set_total(total);
    }
    tracing::debug!(job_id, url, ?declared, "response received");

    while let Some(chunk) = stream.next_chunk().await? {
        let len = chunk.len() as u64;
        if let Some(total) = declared {
            if staging.written() + len > total {
                return Err(TransferError::Overflow(total).into());
            }
        }
        staging.write_chunk(&chunk).await.map_err(TransferError::Storage)?;
        progress.advance(len);
    }

    let received = staging.written();
    if let Some(expected) = declared {
        if received != expected {
            return Err(TransferError::Partial { expected, received }.into());
        }
    }

    let staged = staging.finish().await.map_err(TransferError::Storage)?;
    tracing::debug!(job_id, bytes = received, "transfer complete, installing");
    Ok(ctx.installer.install(staged, name).await?)
}
