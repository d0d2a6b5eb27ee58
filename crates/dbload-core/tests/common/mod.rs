#![allow(dead_code)]

pub mod chunk_server;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dbload_core::api::{self, AppState, TokenGate};
use dbload_core::config::FetchConfig;
use dbload_core::fetch::CurlFetcher;
use dbload_core::install::DirectoryInstaller;
use dbload_core::poller::{self, CurlLoadApi, PollerState};
use dbload_core::registry::JobRegistry;
use dbload_core::task::TaskContext;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Debug, Default, Clone)]
pub struct ServiceOptions {
    pub enable_wal: bool,
    /// (actor, token) pairs; empty leaves the API open.
    pub tokens: Vec<(String, String)>,
}

/// A running load service on an ephemeral port, with its own directories.
pub struct Service {
    pub base_url: String,
    pub installer: Arc<DirectoryInstaller>,
    pub registry: Arc<JobRegistry>,
    pub staging_dir: PathBuf,
    pub database_dir: PathBuf,
    _dirs: TempDir,
    _shutdown: oneshot::Sender<()>,
}

impl Service {
    pub async fn start(opts: ServiceOptions) -> Self {
        let dirs = tempfile::tempdir().unwrap();
        let staging_dir = dirs.path().join("staging");
        let database_dir = dirs.path().join("databases");

        let installer = Arc::new(DirectoryInstaller::new(&database_dir).with_wal(opts.enable_wal));
        let fetch = FetchConfig {
            connect_timeout_secs: 5,
            low_speed_time_secs: 10,
            timeout_secs: 30,
            ..FetchConfig::default()
        };
        let tasks = TaskContext::new(
            Arc::new(CurlFetcher::new(fetch)),
            installer.clone(),
            &staging_dir,
        );
        let mut gate = TokenGate::open();
        for (actor, token) in &opts.tokens {
            gate = gate.with_token(actor, token);
        }
        let registry = Arc::new(JobRegistry::new());
        let state = AppState::new(registry.clone(), tasks, Arc::new(gate));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(api::serve(listener, state, async move {
            let _ = rx.await;
        }));

        Service {
            base_url: format!("http://{}", addr),
            installer,
            registry,
            staging_dir,
            database_dir,
            _dirs: dirs,
            _shutdown: tx,
        }
    }

    pub fn api(&self) -> CurlLoadApi {
        CurlLoadApi::new(&self.base_url).unwrap()
    }

    /// Submits and polls to a terminal state.
    pub async fn load(&self, api: &CurlLoadApi, url: &str, name: &str) -> PollerState {
        tokio::time::timeout(
            Duration::from_secs(30),
            poller::drive(api, url, name, Duration::from_millis(20), |_| {}),
        )
        .await
        .expect("load did not finish in time")
    }

    pub fn database_files(&self) -> Vec<PathBuf> {
        list_dir(&self.database_dir)
    }

    pub fn staging_files(&self) -> Vec<PathBuf> {
        list_dir(&self.staging_dir)
    }
}

pub fn list_dir(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Bytes of a fresh SQLite database with `rows` rows in `items(id, name)`.
pub async fn sqlite_db(rows: i64, text: &str) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source.db");
    let opts = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .unwrap();
    sqlx::query("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)")
        .execute(&pool)
        .await
        .unwrap();
    let mut tx = pool.begin().await.unwrap();
    for i in 0..rows {
        sqlx::query("INSERT INTO items (id, name) VALUES (?, ?)")
            .bind(i)
            .bind(text)
            .execute(&mut *tx)
            .await
            .unwrap();
    }
    tx.commit().await.unwrap();
    pool.close().await;
    std::fs::read(&path).unwrap()
}

pub async fn row_count(path: &Path) -> i64 {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(path))
        .await
        .unwrap();
    let n: i64 = sqlx::query_scalar("SELECT count(*) FROM items")
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    n
}

pub async fn journal_mode(path: &Path) -> String {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(SqliteConnectOptions::new().filename(path))
        .await
        .unwrap();
    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    pool.close().await;
    mode
}

/// Plain HTTP request for checks the typed client does not cover.
/// Returns (status code, body).
pub async fn raw_request(method: &str, url: &str, body: Option<&str>) -> (u32, String) {
    let method = method.to_string();
    let url = url.to_string();
    let body = body.map(str::to_string);
    tokio::task::spawn_blocking(move || {
        let mut easy = curl::easy::Easy::new();
        easy.url(&url).unwrap();
        easy.custom_request(&method).unwrap();
        if let Some(body) = &body {
            easy.post_fields_copy(body.as_bytes()).unwrap();
        }
        let mut out = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| {
                    out.extend_from_slice(data);
                    Ok(data.len())
                })
                .unwrap();
            transfer.perform().unwrap();
        }
        (
            easy.response_code().unwrap(),
            String::from_utf8_lossy(&out).into_owned(),
        )
    })
    .await
    .unwrap()
}

pub fn zip_bytes(member: &str, data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        let opts = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        zip.start_file(member, opts).unwrap();
        zip.write_all(data).unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn tar_gz_bytes(member: &str, data: &[u8]) -> Vec<u8> {
    let enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut tar = tar::Builder::new(enc);
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    tar.append_data(&mut header, member, data).unwrap();
    tar.into_inner().unwrap().finish().unwrap()
}
