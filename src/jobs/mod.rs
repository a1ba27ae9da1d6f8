//! In-memory registry of translation jobs

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// How long finished outputs are advertised after a job starts.
pub const JOB_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLink {
    pub language: String,
    pub file_name: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    /// Unix seconds.
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub files: Vec<String>,
    pub languages: Vec<String>,
    pub links: Vec<OutputLink>,
    pub tokens: u64,
    pub failed_batches: usize,
    pub error: Option<String>,
    #[serde(skip)]
    seq: u64,
}

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Job records keyed by id. Every mutation goes through [`JobStore::update`],
/// which holds the lock for the duration of the closure.
#[derive(Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
    next_seq: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queued job and return its id.
    pub fn create(&self, files: Vec<String>, languages: Vec<String>) -> String {
        let id = Uuid::new_v4().to_string();
        let record = JobRecord {
            id: id.clone(),
            status: JobStatus::Queued,
            progress: 0,
            created_at: now_secs(),
            expires_at: None,
            files,
            languages,
            links: Vec::new(),
            tokens: 0,
            failed_batches: 0,
            error: None,
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
        };
        self.jobs.lock().insert(id.clone(), record);
        id
    }

    /// Apply `f` to the record for `id`. Returns false for unknown ids.
    pub fn update<F: FnOnce(&mut JobRecord)>(&self, id: &str, f: F) -> bool {
        match self.jobs.lock().get_mut(id) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().get(id).cloned()
    }

    /// Completed jobs, newest first.
    #[allow(dead_code)]
    pub fn completed(&self) -> Vec<JobRecord> {
        let mut done: Vec<JobRecord> = self
            .jobs
            .lock()
            .values()
            .filter(|r| r.status == JobStatus::Completed)
            .cloned()
            .collect();
        done.sort_by(|a, b| (b.created_at, b.seq).cmp(&(a.created_at, a.seq)));
        done
    }

    /// Drop a record, handing it back so the caller can clean up its outputs.
    #[allow(dead_code)]
    pub fn remove(&self, id: &str) -> Option<JobRecord> {
        self.jobs.lock().remove(id)
    }

    /// Drop every record at least `max_age` old and return them.
    #[allow(dead_code)]
    pub fn purge_older_than(&self, max_age: Duration) -> Vec<JobRecord> {
        let now = now_secs();
        let mut jobs = self.jobs.lock();
        let stale: Vec<String> = jobs
            .values()
            .filter(|r| now.saturating_sub(r.created_at) >= max_age.as_secs())
            .map(|r| r.id.clone())
            .collect();
        stale.iter().filter_map(|id| jobs.remove(id)).collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_job() -> (JobStore, String) {
        let store = JobStore::new();
        let id = store.create(vec!["doc.idml".into()], vec!["cs".into()]);
        (store, id)
    }

    #[test]
    fn test_create_assigns_unique_ids() {
        let store = JobStore::new();
        let a = store.create(vec![], vec![]);
        let b = store.create(vec![], vec![]);
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(store.len(), 2);

        let record = store.get(&a).unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
    }

    #[test]
    fn test_update_mutates_record() {
        let (store, id) = store_with_job();
        assert!(store.update(&id, |r| {
            r.status = JobStatus::Running;
            r.progress = 42;
        }));

        let record = store.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Running);
        assert_eq!(record.progress, 42);
        assert!(!store.update("missing", |r| r.progress = 1));
    }

    #[test]
    fn test_completed_newest_first() {
        let store = JobStore::new();
        let first = store.create(vec![], vec![]);
        let second = store.create(vec![], vec![]);
        let running = store.create(vec![], vec![]);
        for id in [&first, &second] {
            store.update(id, |r| r.status = JobStatus::Completed);
        }
        store.update(&running, |r| r.status = JobStatus::Running);

        let ids: Vec<String> = store.completed().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_remove_returns_record() {
        let (store, id) = store_with_job();
        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.files, vec!["doc.idml"]);
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_older_than() {
        let (store, id) = store_with_job();
        assert!(store.purge_older_than(JOB_TTL).is_empty());

        store.update(&id, |r| r.created_at -= JOB_TTL.as_secs() + 1);
        let purged = store.purge_older_than(JOB_TTL);
        assert_eq!(purged.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_serializes_without_internal_fields() {
        let (store, id) = store_with_job();
        let json = serde_json::to_value(store.get(&id).unwrap()).unwrap();
        assert_eq!(json["status"], "queued");
        assert!(json.get("seq").is_none());
    }
}
