//! Job queue trait and the in-process implementation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::JobError;
use crate::types::{JobEnvelope, JobStats, JobStatus, QueuedJob};

/// Storage for queued jobs.
///
/// `fetch_due` claims jobs atomically: a returned job is marked
/// [`JobStatus::Running`] before any worker sees it, so no two workers ever
/// process the same dequeued job concurrently.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Add a job to the queue; returns its identifier.
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid, JobError>;

    /// Claim up to `limit` jobs that are ready to run: pending jobs, plus
    /// failed jobs whose `next_retry_at` has passed.
    async fn fetch_due(&self, limit: usize) -> Result<Vec<QueuedJob>, JobError>;

    async fn mark_succeeded(&self, id: Uuid) -> Result<(), JobError>;

    /// Record a failed attempt and schedule the next one.
    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), JobError>;

    /// Terminal failure: the job is never picked up again.
    async fn mark_permanently_failed(&self, id: Uuid, error: &str) -> Result<(), JobError>;

    async fn get(&self, id: Uuid) -> Result<Option<QueuedJob>, JobError>;

    async fn stats(&self) -> Result<JobStats, JobError>;
}

/// Type alias for a shareable queue instance.
pub type QueueHandle = Arc<dyn JobQueue>;

/// In-process queue for single-instance deployments and tests.
///
/// Jobs are kept in insertion order so the oldest ready job is always
/// claimed first. Not durable across restarts; deployments that need
/// durability use [`crate::redis_queue::RedisQueue`].
#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<Vec<QueuedJob>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_jobs<R>(&self, f: impl FnOnce(&mut Vec<QueuedJob>) -> R) -> Result<R, JobError> {
        self.jobs
            .lock()
            .map(|mut jobs| f(&mut jobs))
            .map_err(|_| JobError::Queue("job table lock poisoned".into()))
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut QueuedJob)) -> Result<(), JobError> {
        self.with_jobs(|jobs| match jobs.iter_mut().find(|job| job.id == id) {
            Some(job) => {
                f(job);
                Ok(())
            }
            None => Err(JobError::Queue(format!("unknown job {id}"))),
        })?
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid, JobError> {
        let job = QueuedJob::new(envelope);
        let id = job.id;
        self.with_jobs(|jobs| jobs.push(job))?;
        Ok(id)
    }

    async fn fetch_due(&self, limit: usize) -> Result<Vec<QueuedJob>, JobError> {
        let now = OffsetDateTime::now_utc();
        self.with_jobs(|jobs| {
            jobs.iter_mut()
                .filter(|job| match job.status {
                    JobStatus::Pending => true,
                    JobStatus::Failed => job.next_retry_at.is_some_and(|at| at <= now),
                    _ => false,
                })
                .take(limit)
                .map(|job| {
                    job.status = JobStatus::Running;
                    job.clone()
                })
                .collect()
        })
    }

    async fn mark_succeeded(&self, id: Uuid) -> Result<(), JobError> {
        self.update(id, |job| {
            job.status = JobStatus::Succeeded;
            job.next_retry_at = None;
        })
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), JobError> {
        self.update(id, |job| {
            job.status = JobStatus::Failed;
            job.retry_count += 1;
            job.last_error = Some(error.to_string());
            job.next_retry_at = Some(next_retry_at);
        })
    }

    async fn mark_permanently_failed(&self, id: Uuid, error: &str) -> Result<(), JobError> {
        self.update(id, |job| {
            job.status = JobStatus::PermanentlyFailed;
            job.last_error = Some(error.to_string());
            job.next_retry_at = None;
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedJob>, JobError> {
        self.with_jobs(|jobs| jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn stats(&self) -> Result<JobStats, JobError> {
        self.with_jobs(|jobs| {
            let mut stats = JobStats::default();
            for job in jobs.iter() {
                stats.count(job.status);
            }
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JobKind;

    #[tokio::test]
    async fn fetch_due_claims_each_job_once() {
        let queue = MemoryQueue::new();
        queue
            .enqueue(JobEnvelope::new(JobKind::EveningReminder))
            .await
            .unwrap();

        let first = queue.fetch_due(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, JobStatus::Running);

        // Already claimed, nothing left to fetch.
        assert!(queue.fetch_due(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_becomes_due_after_its_delay() {
        let queue = MemoryQueue::new();
        let id = queue
            .enqueue(JobEnvelope::new(JobKind::MonthlyReport))
            .await
            .unwrap();
        queue.fetch_due(1).await.unwrap();

        let future = OffsetDateTime::now_utc() + time::Duration::minutes(5);
        queue.schedule_retry(id, future, "smtp timeout").await.unwrap();
        assert!(queue.fetch_due(1).await.unwrap().is_empty());

        let past = OffsetDateTime::now_utc() - time::Duration::seconds(1);
        queue.schedule_retry(id, past, "smtp timeout").await.unwrap();
        let due = queue.fetch_due(1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 2);
    }

    #[tokio::test]
    async fn permanently_failed_jobs_stay_dead() {
        let queue = MemoryQueue::new();
        let id = queue
            .enqueue(JobEnvelope::new(JobKind::UserExport))
            .await
            .unwrap();
        queue.fetch_due(1).await.unwrap();
        queue.mark_permanently_failed(id, "boom").await.unwrap();

        assert!(queue.fetch_due(10).await.unwrap().is_empty());
        let job = queue.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::PermanentlyFailed);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        let stats = queue.stats().await.unwrap();
        assert_eq!(stats.permanently_failed, 1);
    }

    #[tokio::test]
    async fn oldest_jobs_are_fetched_first() {
        let queue = MemoryQueue::new();
        let first = queue
            .enqueue(JobEnvelope::new(JobKind::MorningReminder))
            .await
            .unwrap();
        let _second = queue
            .enqueue(JobEnvelope::new(JobKind::EveningReminder))
            .await
            .unwrap();

        let due = queue.fetch_due(1).await.unwrap();
        assert_eq!(due[0].id, first);
    }
}
