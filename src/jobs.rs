//! Job tracker: owns the lifecycle and status of asynchronous processing
//! jobs. All mutating operations serialize through one mutex guarding the
//! job table; reads take a snapshot clone.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::model::{Job, JobStatus};

#[derive(Debug, thiserror::Error)]
pub enum JobTrackerError {
    #[error("job {0} not found")]
    NotFound(String),
    #[error("job {job_id} cannot transition from {from:?} to {to:?}")]
    InvalidTransition { job_id: String, from: JobStatus, to: JobStatus },
}

pub struct JobTracker {
    jobs: Mutex<HashMap<String, Job>>,
}

impl Default for JobTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTracker {
    pub fn new() -> Self {
        JobTracker { jobs: Mutex::new(HashMap::new()) }
    }

    /// Time-sortable job ID: UUIDv7 embeds a millisecond timestamp, so job
    /// IDs naturally sort by creation order.
    pub fn register(&self, request_id: &str) -> String {
        let job_id = uuid::Uuid::now_v7().to_string();
        let now = chrono::Utc::now();
        let job = Job {
            job_id: job_id.clone(),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
            request_id: request_id.to_string(),
            result: None,
            error: None,
        };
        self.jobs.lock().unwrap().insert(job_id.clone(), job);
        job_id
    }

    pub fn start(&self, job_id: &str) -> Result<(), JobTrackerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| JobTrackerError::NotFound(job_id.to_string()))?;
        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Running;
                job.updated_at = chrono::Utc::now();
                Ok(())
            }
            JobStatus::Running => Ok(()), // idempotent
            other => Err(JobTrackerError::InvalidTransition { job_id: job_id.to_string(), from: other, to: JobStatus::Running }),
        }
    }

    pub fn complete(&self, job_id: &str, result: serde_json::Value) -> Result<(), JobTrackerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| JobTrackerError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Running {
            return Err(JobTrackerError::InvalidTransition { job_id: job_id.to_string(), from: job.status, to: JobStatus::Completed });
        }
        job.status = JobStatus::Completed;
        job.result = Some(result);
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn fail(&self, job_id: &str, error: &str) -> Result<(), JobTrackerError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(job_id).ok_or_else(|| JobTrackerError::NotFound(job_id.to_string()))?;
        if job.status != JobStatus::Running {
            return Err(JobTrackerError::InvalidTransition { job_id: job_id.to_string(), from: job.status, to: JobStatus::Failed });
        }
        job.status = JobStatus::Failed;
        job.error = Some(error.to_string());
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| matches!(j.status, JobStatus::Pending | JobStatus::Running))
            .count()
    }

    /// Evicts jobs older than `retention` (default 24h), called on each
    /// sweeper tick (default every 60s).
    pub fn sweep(&self, retention: chrono::Duration, now: chrono::DateTime<chrono::Utc>) -> usize {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| now.signed_duration_since(job.created_at) < retention);
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_monotonic() {
        let tracker = JobTracker::new();
        let job_id = tracker.register("req-1");
        assert_eq!(tracker.get(&job_id).unwrap().status, JobStatus::Pending);

        tracker.start(&job_id).unwrap();
        assert_eq!(tracker.get(&job_id).unwrap().status, JobStatus::Running);

        tracker.start(&job_id).unwrap(); // idempotent
        tracker.complete(&job_id, serde_json::json!({"ok": true})).unwrap();
        assert_eq!(tracker.get(&job_id).unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn rejects_completion_from_pending() {
        let tracker = JobTracker::new();
        let job_id = tracker.register("req-1");
        let err = tracker.complete(&job_id, serde_json::json!({})).unwrap_err();
        assert!(matches!(err, JobTrackerError::InvalidTransition { .. }));
    }

    #[test]
    fn unknown_job_id_is_not_found() {
        let tracker = JobTracker::new();
        assert!(tracker.get("does-not-exist").is_none());
        assert!(matches!(tracker.start("does-not-exist"), Err(JobTrackerError::NotFound(_))));
    }

    #[test]
    fn sweep_evicts_expired_jobs() {
        let tracker = JobTracker::new();
        let job_id = tracker.register("req-1");
        let far_future = chrono::Utc::now() + chrono::Duration::hours(25);
        let evicted = tracker.sweep(chrono::Duration::hours(24), far_future);
        assert_eq!(evicted, 1);
        assert!(tracker.get(&job_id).is_none());
    }

    #[test]
    fn job_ids_are_unique_and_time_sortable() {
        let tracker = JobTracker::new();
        let a = tracker.register("req-1");
        let b = tracker.register("req-2");
        assert_ne!(a, b);
        assert!(a < b);
    }
}
