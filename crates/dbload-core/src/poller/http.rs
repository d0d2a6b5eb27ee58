//! [`LoadApi`] over HTTP using libcurl.

use std::time::Duration;

use async_trait::async_trait;
use curl::easy::{Easy, List};
use serde::Deserialize;
use url::Url;

use super::{ApiCallError, LoadApi};
use crate::job::JobStatus;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to a running `dbload serve` instance.
#[derive(Debug, Clone)]
pub struct CurlLoadApi {
    server: Url,
    token: Option<String>,
    timeout: Duration,
}

impl CurlLoadApi {
    /// `server` is the service root, e.g. `http://127.0.0.1:8001`.
    pub fn new(server: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            server: Url::parse(server)?,
            token: None,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute status URLs are used as-is; relative ones are joined to the server.
    fn resolve(&self, path: &str) -> Result<Url, ApiCallError> {
        self.server
            .join(path)
            .map_err(|e| ApiCallError::Transport(format!("invalid URL {}: {}", path, e)))
    }

    async fn call(&self, url: Url, body: Option<Vec<u8>>) -> Result<JobStatus, ApiCallError> {
        let token = self.token.clone();
        let timeout = self.timeout;
        let (code, bytes) =
            tokio::task::spawn_blocking(move || perform(url.as_str(), token.as_deref(), body, timeout))
                .await
                .map_err(|e| ApiCallError::Transport(e.to_string()))?
                .map_err(|e| ApiCallError::Transport(e.to_string()))?;
        decode(code, &bytes)
    }
}

/// Maps an HTTP reply onto a job snapshot or the server's `{"error"}` message.
fn decode(code: u32, bytes: &[u8]) -> Result<JobStatus, ApiCallError> {
    if (200..300).contains(&code) {
        return serde_json::from_slice(bytes)
            .map_err(|e| ApiCallError::Transport(format!("invalid response: {}", e)));
    }
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => Err(ApiCallError::Rejected(body.error)),
        Err(_) => Err(ApiCallError::Rejected(format!("HTTP {}", code))),
    }
}

fn perform(
    url: &str,
    token: Option<&str>,
    body: Option<Vec<u8>>,
    timeout: Duration,
) -> Result<(u32, Vec<u8>), curl::Error> {
    let mut easy = Easy::new();
    easy.url(url)?;
    easy.timeout(timeout)?;
    easy.useragent(concat!("dbload/", env!("CARGO_PKG_VERSION")))?;

    let mut headers = List::new();
    headers.append("Accept: application/json")?;
    if let Some(token) = token {
        headers.append(&format!("Authorization: Bearer {}", token))?;
    }
    if let Some(body) = body {
        headers.append("Content-Type: application/json")?;
        easy.post(true)?;
        easy.post_fields_copy(&body)?;
    }
    easy.http_headers(headers)?;

    let mut out = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            out.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform()?;
    }
    let code = easy.response_code()?;
    Ok((code, out))
}

#[async_trait]
impl LoadApi for CurlLoadApi {
    async fn submit(&self, url: &str, name: &str) -> Result<JobStatus, ApiCallError> {
        let endpoint = self.resolve("/-/load")?;
        let body = serde_json::json!({ "url": url, "name": name }).to_string();
        self.call(endpoint, Some(body.into_bytes())).await
    }

    async fn status(&self, status_url: &str) -> Result<JobStatus, ApiCallError> {
        let url = self.resolve(status_url)?;
        self.call(url, None).await
    }
}
