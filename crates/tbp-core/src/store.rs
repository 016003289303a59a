use std::{
    collections::HashMap,
    fs,
    path::PathBuf,
    sync::Mutex,
};

use crate::{domain::JobId, scheduler::Job, Result};

/// Durable record of job definitions.
///
/// Timers are never persisted; what happens to a restored job is the
/// scheduler's decision, not the store's.
pub trait JobStore: Send + Sync {
    fn load_all(&self) -> Result<Vec<Job>>;
    fn upsert(&self, job: &Job) -> Result<()>;
    fn remove(&self, id: &JobId) -> Result<()>;
}

/// JSON-file job store: one document holding a map keyed by job id,
/// rewritten atomically (temp file + rename) on every mutation.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles; file i/o itself is cheap here.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<HashMap<String, Job>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_map(&self, map: &HashMap<String, Job>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(map)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl JobStore for FileStore {
    fn load_all(&self) -> Result<Vec<Job>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut jobs: Vec<Job> = self.read_map()?.into_values().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    fn upsert(&self, job: &Job) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        map.insert(job.id.0.clone(), job.clone());
        self.write_map(&map)
    }

    fn remove(&self, id: &JobId) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.read_map()?;
        if map.remove(&id.0).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{SessionId, Target},
        scheduler::{Job, JobStats, JobStatus},
    };
    use chrono::Utc;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    fn job(id: &str) -> Job {
        Job {
            id: JobId(id.to_string()),
            session_id: SessionId("main".to_string()),
            targets: vec![Target("@chan".to_string())],
            message: "hi".to_string(),
            interval_secs: 10,
            repeat_limit: Some(3),
            status: JobStatus::Paused,
            stats: JobStats::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_trips_jobs_through_the_file() {
        let store = FileStore::new(tmp("tbp-store-test"));
        store.upsert(&job("a")).unwrap();
        store.upsert(&job("b")).unwrap();

        let jobs = store.load_all().unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().any(|j| j.id.0 == "a"));
        assert!(jobs.iter().any(|j| j.id.0 == "b"));
    }

    #[test]
    fn remove_deletes_one_entry() {
        let store = FileStore::new(tmp("tbp-store-remove-test"));
        store.upsert(&job("a")).unwrap();
        store.upsert(&job("b")).unwrap();
        store.remove(&JobId("a".to_string())).unwrap();

        let jobs = store.load_all().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id.0, "b");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let store = FileStore::new(tmp("tbp-store-missing-test"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn rewrite_leaves_valid_json_on_disk() {
        let path = tmp("tbp-store-json-test");
        let store = FileStore::new(path.clone());
        store.upsert(&job("a")).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        let parsed: HashMap<String, Job> = serde_json::from_str(&raw).unwrap();
        assert!(parsed.contains_key("a"));
    }
}
