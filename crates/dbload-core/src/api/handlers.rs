use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{Html, Json};

use super::request::LoadRequest;
use super::{ApiError, AppState};
use crate::job::JobStatus;
use crate::task::spawn_download;

const LOAD_PAGE: &str = include_str!("../../assets/load.html");

/// `GET /-/load`: the browser form and poller.
pub async fn page() -> Html<&'static str> {
    Html(LOAD_PAGE)
}

/// `POST /-/load`: validate, register the job, start its task, reply at once.
pub async fn submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<JobStatus>, ApiError> {
    let actor = state.gate.check(&headers)?;
    let req = LoadRequest::from_body(&body)?;
    req.validate(&state.allowed_schemes)?;

    let (record, progress) = state.registry.create(req.url, req.name);
    tracing::info!(
        job_id = %record.id,
        actor = %actor,
        url = %record.url,
        name = %record.name,
        "load job created"
    );
    let initial = record.status(state.status_url(&record.id));
    spawn_download(
        state.tasks.clone(),
        record.url.clone(),
        record.name.clone(),
        progress,
    );
    Ok(Json(initial))
}

/// `GET /-/load/status/:job_id`
pub async fn status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<JobStatus>, ApiError> {
    state.gate.check(&headers)?;
    let record = state.registry.get(&job_id)?;
    Ok(Json(record.status(state.status_url(&record.id))))
}

/// `GET /-/load/jobs`: every job, oldest first.
pub async fn jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<JobStatus>>, ApiError> {
    state.gate.check(&headers)?;
    let all = state
        .registry
        .list()
        .iter()
        .map(|r| r.status(state.status_url(&r.id)))
        .collect();
    Ok(Json(all))
}
