//! `dbload serve` – run the HTTP load service until Ctrl-C.

use std::sync::Arc;

use anyhow::{Context, Result};
use dbload_core::api::{self, AppState, TokenGate};
use dbload_core::config::DbloadConfig;
use dbload_core::fetch::CurlFetcher;
use dbload_core::install::DirectoryInstaller;
use dbload_core::registry::JobRegistry;
use dbload_core::storage;
use dbload_core::task::TaskContext;
use tokio::net::TcpListener;

pub async fn run_serve(cfg: &DbloadConfig, bind: Option<&str>) -> Result<()> {
    let staging_dir = cfg.staging_dir()?;
    let removed = storage::remove_stale(&staging_dir)
        .await
        .with_context(|| format!("failed to clean staging dir: {}", staging_dir.display()))?;
    if removed > 0 {
        tracing::info!(removed, "removed leftover staging files");
    }

    let installer = Arc::new(DirectoryInstaller::from_config(cfg)?);
    let existing = installer.scan_existing().await.with_context(|| {
        format!(
            "failed to read database dir: {}",
            installer.database_dir().display()
        )
    })?;
    tracing::info!(
        count = existing,
        dir = %installer.database_dir().display(),
        "existing databases"
    );

    let tasks = TaskContext::new(
        Arc::new(CurlFetcher::new(cfg.fetch_config())),
        installer.clone(),
        staging_dir,
    );
    let gate = TokenGate::from_config(cfg.auth.as_ref());
    if gate.is_open() {
        tracing::warn!("no [auth.tokens] configured; the load API accepts every caller");
    }
    let state = AppState::new(Arc::new(JobRegistry::new()), tasks, Arc::new(gate))
        .with_base_url(cfg.base_url.clone())
        .with_allowed_schemes(cfg.allowed_schemes.clone());

    let addr = bind.unwrap_or(&cfg.bind);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    println!("dbload listening on http://{}/-/load", listener.local_addr()?);

    api::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    })
    .await
    .context("server error")?;
    Ok(())
}
