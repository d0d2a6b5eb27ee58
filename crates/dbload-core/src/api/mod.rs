//! HTTP surface: job submission, status polling, and the load page.
//!
//! Routes:
//! - `GET  /-/load`                 HTML form with a progress poller
//! - `POST /-/load`                 `{"url", "name"}` -> initial job snapshot
//! - `GET  /-/load/status/:job_id`  current job snapshot, 404 if unknown
//! - `GET  /-/load/jobs`            all job snapshots

mod auth;
mod error;
mod handlers;
mod request;

pub use auth::{Actor, PermissionError, PermissionGate, TokenGate};
pub use error::ApiError;
pub use request::{validate_name, validate_url, LoadRequest};

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use crate::registry::JobRegistry;
use crate::task::TaskContext;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub tasks: TaskContext,
    pub gate: Arc<dyn PermissionGate>,
    /// Prefix for absolute `status_url`s; relative paths when `None`.
    pub base_url: Option<Arc<str>>,
    pub allowed_schemes: Arc<[String]>,
}

impl AppState {
    pub fn new(registry: Arc<JobRegistry>, tasks: TaskContext, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            registry,
            tasks,
            gate,
            base_url: None,
            allowed_schemes: Arc::from(vec!["http".to_string(), "https".to_string()]),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url
            .map(|b| b.trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .map(Arc::from);
        self
    }

    pub fn with_allowed_schemes(mut self, schemes: Vec<String>) -> Self {
        self.allowed_schemes = Arc::from(schemes);
        self
    }

    /// Where clients poll for `job_id`.
    pub fn status_url(&self, job_id: &str) -> String {
        let path = format!("/-/load/status/{}", job_id);
        match &self.base_url {
            Some(base) => format!("{}{}", base, path),
            None => path,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/-/load", get(handlers::page).post(handlers::submit))
        .route("/-/load/status/:job_id", get(handlers::status))
        .route("/-/load/jobs", get(handlers::jobs))
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("listening on http://{}/-/load", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
