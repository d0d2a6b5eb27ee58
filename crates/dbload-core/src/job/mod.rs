//! Job model: the immutable identity of a load job plus its progress channel.
//!
//! A job's progress lives in a `tokio::sync::watch` channel. The registry keeps
//! a [`JobRecord`] holding the receiving side; the download task owns the only
//! [`JobProgress`] (the sending side). `JobProgress` is not `Clone`, so each
//! record has exactly one writer, and `finish` consumes it, so nothing can be
//! written once a job is done.

mod status;

pub use status::JobStatus;

use serde::Serialize;
use tokio::sync::watch;

/// Job identifier (a UUID v4 string).
pub type JobId = String;

/// Mutable part of a job, as seen by readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Bytes written to the staging file so far.
    pub done_bytes: u64,
    /// Declared total size; `0` means unknown.
    pub todo_bytes: u64,
    /// True once the job reached a terminal state (success or failure).
    pub done: bool,
    /// Failure description; `None` with `done` means success.
    pub error: Option<String>,
}

/// Read side of a job, stored in the registry.
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub url: String,
    pub name: String,
    seq: u64,
    progress: watch::Receiver<Progress>,
}

impl JobRecord {
    /// Creates a record in the initial state and the single writer for it.
    pub fn new(id: JobId, url: String, name: String, seq: u64) -> (Self, JobProgress) {
        let (tx, rx) = watch::channel(Progress::default());
        let record = JobRecord {
            id: id.clone(),
            url,
            name,
            seq,
            progress: rx,
        };
        (record, JobProgress { id, tx })
    }

    /// Latest progress values.
    pub fn progress(&self) -> Progress {
        self.progress.borrow().clone()
    }

    /// A receiver that is notified on every progress change.
    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.clone()
    }

    /// Creation order within the registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wire representation of the current state.
    pub fn status(&self, status_url: String) -> JobStatus {
        let p = self.progress();
        JobStatus {
            id: self.id.clone(),
            url: self.url.clone(),
            name: self.name.clone(),
            done: p.done,
            error: p.error,
            todo_bytes: p.todo_bytes,
            done_bytes: p.done_bytes,
            status_url,
        }
    }
}

/// Write side of a job. Owned by the job's download task.
#[derive(Debug)]
pub struct JobProgress {
    id: JobId,
    tx: watch::Sender<Progress>,
}

impl JobProgress {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn done_bytes(&self) -> u64 {
        self.tx.borrow().done_bytes
    }

    pub fn todo_bytes(&self) -> u64 {
        self.tx.borrow().todo_bytes
    }

    /// Records the declared total size. Only takes effect while the total is
    /// still unknown and before any byte was counted; returns whether it did.
    pub fn set_total(&self, total: u64) -> bool {
        self.tx.send_if_modified(|p| {
            if p.done || p.todo_bytes != 0 || p.done_bytes != 0 || total == 0 {
                return false;
            }
            p.todo_bytes = total;
            true
        })
    }

    /// Adds `n` bytes to the counter, clamped to the declared total.
    /// Returns the new `done_bytes`.
    pub fn advance(&self, n: u64) -> u64 {
        self.tx.send_if_modified(|p| {
            let mut next = p.done_bytes.saturating_add(n);
            if p.todo_bytes > 0 {
                next = next.min(p.todo_bytes);
            }
            if next == p.done_bytes {
                return false;
            }
            p.done_bytes = next;
            true
        });
        self.done_bytes()
    }

    /// Moves the job to its terminal state. Consumes the writer.
    pub fn finish(self, outcome: Result<(), String>) {
        self.tx.send_modify(|p| {
            p.done = true;
            p.error = outcome.err();
        });
    }
}

impl Drop for JobProgress {
    fn drop(&mut self) {
        // Reached without `finish` only when the task unwound or was dropped.
        let finished = self.tx.borrow().done;
        if !finished {
            tracing::warn!(job_id = %self.id, "download task ended without a result");
            self.tx.send_modify(|p| {
                p.done = true;
                p.error = Some("download task ended unexpectedly".to_string());
            });
        }
    }
}
