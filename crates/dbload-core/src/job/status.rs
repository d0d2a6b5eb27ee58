//! Wire shape shared by the submission/status endpoints and the poller.

use serde::{Deserialize, Serialize};

/// JSON body returned by `POST /-/load` and `GET /-/load/status/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub url: String,
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
    /// `0` means the total size is unknown.
    pub todo_bytes: u64,
    pub done_bytes: u64,
    pub status_url: String,
}

impl JobStatus {
    /// Fraction complete in [0.0, 1.0], or `None` when the size is unknown.
    pub fn fraction(&self) -> Option<f64> {
        if self.todo_bytes == 0 {
            return None;
        }
        Some((self.done_bytes as f64 / self.todo_bytes as f64).min(1.0))
    }

    pub fn succeeded(&self) -> bool {
        self.done && self.error.is_none()
    }
}
