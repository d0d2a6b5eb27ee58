//! Turning a staged download into a served database.

mod archive;
mod directory;

pub use archive::ArchiveKind;
pub use directory::DirectoryInstaller;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::StagedFile;

/// Failures while validating or installing a staged file.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("install failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("file is not a SQLite database")]
    NotSqlite,
    #[error("integrity check failed: {0}")]
    Malformed(String),
    #[error("{0}")]
    Database(#[from] sqlx::Error),
    #[error("could not read archive: {0}")]
    Archive(String),
    #[error("uncompressed database would be more than {ratio}x the size of the archive")]
    TooLarge { ratio: u64 },
    #[error("archive does not contain a database file")]
    NoDatabaseInArchive,
    #[error("install task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Host-side step run after a download completes.
///
/// Takes ownership of the staged file: on success it has been moved into
/// place, on failure it is dropped (and therefore deleted).
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, staged: StagedFile, name: &str) -> Result<PathBuf, InstallError>;
}
