//! In-process job registry: job id -> record.
//!
//! The registry only adds and looks up. Progress is written by each job's
//! download task through its own `JobProgress`, never through the registry.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use uuid::Uuid;

use crate::job::{JobProgress, JobRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("job {0} not found")]
    NotFound(String),
}

/// Shared registry of load jobs. Passed to the HTTP handlers via `AppState`.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, Arc<JobRecord>>>,
    next_seq: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh id and stores a record in the initial state.
    /// Returns the record and the writer to hand to its download task.
    pub fn create(&self, url: String, name: String) -> (Arc<JobRecord>, JobProgress) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        loop {
            let id = Uuid::new_v4().to_string();
            if let Entry::Vacant(slot) = jobs.entry(id.clone()) {
                let (record, progress) = JobRecord::new(id, url, name, seq);
                let record = Arc::new(record);
                slot.insert(Arc::clone(&record));
                return (record, progress);
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<Arc<JobRecord>, RegistryError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Arc<JobRecord>> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.seq());
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn create_then_get() {
        let registry = JobRegistry::new();
        let (record, _progress) = registry.create(
            "https://example.test/data.db".to_string(),
            "tils".to_string(),
        );
        let found = registry.get(&record.id).unwrap();
        assert_eq!(found.url, "https://example.test/data.db");
        assert_eq!(found.name, "tils");
        assert_eq!(found.progress().done_bytes, 0);
        assert_eq!(found.progress().todo_bytes, 0);
        assert!(!found.progress().done);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = JobRegistry::new();
        assert_eq!(
            registry.get("invalid-job-id").unwrap_err(),
            RegistryError::NotFound("invalid-job-id".to_string())
        );
    }

    #[test]
    fn ids_are_unique() {
        let registry = JobRegistry::new();
        let ids: HashSet<String> = (0..200)
            .map(|i| registry.create(format!("https://example.test/{i}"), "n".to_string()).0.id.clone())
            .collect();
        assert_eq!(ids.len(), 200);
        assert_eq!(registry.len(), 200);
    }

    #[test]
    fn list_is_in_creation_order() {
        let registry = JobRegistry::new();
        let (a, _pa) = registry.create("https://a.test/".to_string(), "a".to_string());
        let (b, _pb) = registry.create("https://b.test/".to_string(), "b".to_string());
        let listed: Vec<_> = registry.list().iter().map(|j| j.id.clone()).collect();
        assert_eq!(listed, vec![a.id.clone(), b.id.clone()]);
    }

    #[test]
    fn record_sees_writer_updates() {
        let registry = JobRegistry::new();
        let (record, progress) = registry.create("https://a.test/".to_string(), "a".to_string());
        progress.set_total(10);
        progress.advance(4);
        let found = registry.get(&record.id).unwrap();
        assert_eq!(found.progress().done_bytes, 4);
        assert_eq!(found.progress().todo_bytes, 10);
    }
}
