//! Installs downloaded databases as `<name>.db` files in one directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tokio::io::AsyncReadExt;

use super::{archive, InstallError, Installer};
use crate::config::DbloadConfig;
use crate::storage::StagedFile;

/// First 16 bytes of every SQLite 3 database file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Validates staged files and moves them into `database_dir`.
#[derive(Debug)]
pub struct DirectoryInstaller {
    database_dir: PathBuf,
    enable_wal: bool,
    max_archive_ratio: u64,
    catalog: RwLock<HashMap<String, PathBuf>>,
}

impl DirectoryInstaller {
    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_dir: database_dir.into(),
            enable_wal: false,
            max_archive_ratio: 20,
            catalog: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(cfg: &DbloadConfig) -> Result<Self> {
        Ok(Self::new(cfg.database_dir()?)
            .with_wal(cfg.enable_wal)
            .with_max_archive_ratio(cfg.max_archive_ratio))
    }

    pub fn with_wal(mut self, enable_wal: bool) -> Self {
        self.enable_wal = enable_wal;
        self
    }

    pub fn with_max_archive_ratio(mut self, ratio: u64) -> Self {
        self.max_archive_ratio = ratio.max(1);
        self
    }

    pub fn database_dir(&self) -> &Path {
        &self.database_dir
    }

    /// Path of the database installed under `name`, if any.
    pub fn installed(&self, name: &str) -> Option<PathBuf> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Installed database names, sorted.
    pub fn installed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Adds `*.db` files already present in the database directory to the catalog.
    pub async fn scan_existing(&self) -> std::io::Result<usize> {
        tokio::fs::create_dir_all(&self.database_dir).await?;
        let mut dir = tokio::fs::read_dir(&self.database_dir).await?;
        let mut found = 0;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                self.record(stem, path.clone());
                found += 1;
            }
        }
        Ok(found)
    }

    fn record(&self, name: &str, path: PathBuf) {
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), path);
    }

    /// Replaces an archive with its extracted database; plain files pass through.
    async fn unpack(&self, staged: StagedFile) -> Result<StagedFile, InstallError> {
        let path = staged.path().to_path_buf();
        let kind = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || archive::detect(&path)).await??
        };
        let Some(kind) = kind else {
            return Ok(staged);
        };
        tracing::debug!(path = %path.display(), ?kind, "staged file is an archive");
        let ratio = self.max_archive_ratio;
        let (extracted, len) =
            tokio::task::spawn_blocking(move || archive::extract_database(&path, kind, ratio))
                .await??;
        drop(staged);
        Ok(StagedFile::from_temp_path(extracted, len))
    }

    /// Opens the file with SQLite, runs `quick_check` and sets the journal mode.
    async fn verify(&self, path: &Path) -> Result<(), InstallError> {
        check_header(path).await?;

        let journal_mode = if self.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(false)
            .journal_mode(journal_mode);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let checked: Result<(), InstallError> = async {
            let rows: Vec<String> = sqlx::query_scalar("PRAGMA quick_check")
                .fetch_all(&pool)
                .await?;
            if rows.len() == 1 && rows[0] == "ok" {
                Ok(())
            } else {
                Err(InstallError::Malformed(rows.join("; ")))
            }
        }
        .await;
        pool.close().await;
        checked
    }
}

async fn check_header(path: &Path) -> Result<(), InstallError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; 16];
    match file.read_exact(&mut head).await {
        Ok(_) if &head == SQLITE_HEADER => Ok(()),
        Ok(_) => Err(InstallError::NotSqlite),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(InstallError::NotSqlite),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Installer for DirectoryInstaller {
    async fn install(&self, staged: StagedFile, name: &str) -> Result<PathBuf, InstallError> {
        let staged = self.unpack(staged).await?;
        self.verify(staged.path()).await?;

        tokio::fs::create_dir_all(&self.database_dir).await?;
        let dest = self.database_dir.join(format!("{}.db", name));
        let replaced = self.installed(name).is_some() || dest.exists();
        let installed = staged.persist(&dest)?;
        self.record(name, installed.clone());
        tracing::info!(
            name,
            path = %installed.display(),
            wal = self.enable_wal,
            replaced,
            "database installed"
        );
        Ok(installed)
    }
}
