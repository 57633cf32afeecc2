//! Redis-backed durable job queue.
//!
//! Layout, all under a configurable namespace prefix:
//! - `{ns}job:{id}`: JSON record of the [`QueuedJob`]
//! - `{ns}jobs:ready`: list of ids ready to run (LPUSH / RPOP)
//! - `{ns}jobs:retry`: sorted set of ids scored by retry unix time
//!
//! Jobs survive process restarts; a restarted worker pool resumes from the
//! ready list. A job already popped off the ready list when the process dies
//! is lost rather than redelivered; producers that care re-trigger through
//! the admin surface.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::JobError;
use crate::types::{JobEnvelope, JobStats, JobStatus, QueuedJob};
use crate::queue::JobQueue;

/// How long finished job records stay readable for status lookups.
const TERMINAL_RECORD_TTL_SECS: i64 = 86_400;

pub struct RedisQueue {
    pool: Pool,
    namespace: String,
}

impl RedisQueue {
    pub fn new(pool: Pool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    fn job_key(&self, id: Uuid) -> String {
        format!("{}job:{id}", self.namespace)
    }

    fn ready_key(&self) -> String {
        format!("{}jobs:ready", self.namespace)
    }

    fn retry_key(&self) -> String {
        format!("{}jobs:retry", self.namespace)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, JobError> {
        self.pool
            .get()
            .await
            .map_err(|e| JobError::Queue(format!("redis connection: {e}")))
    }

    async fn load(
        &self,
        conn: &mut deadpool_redis::Connection,
        id: Uuid,
    ) -> Result<Option<QueuedJob>, JobError> {
        let raw: Option<String> = conn
            .get(self.job_key(id))
            .await
            .map_err(|e| JobError::Queue(format!("redis GET: {e}")))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| JobError::Queue(format!("corrupt job record {id}: {e}"))),
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        conn: &mut deadpool_redis::Connection,
        job: &QueuedJob,
    ) -> Result<(), JobError> {
        let json = serde_json::to_string(job)
            .map_err(|e| JobError::Queue(format!("serialize job {}: {e}", job.id)))?;
        conn.set::<_, _, ()>(self.job_key(job.id), json)
            .await
            .map_err(|e| JobError::Queue(format!("redis SET: {e}")))
    }

    /// Move retry-set entries whose time has come onto the ready list.
    ///
    /// ZREM is the claim: only the caller that removes the member re-queues
    /// it, so concurrent workers never double-promote a retry.
    async fn promote_due_retries(
        &self,
        conn: &mut deadpool_redis::Connection,
        limit: usize,
    ) -> Result<(), JobError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let due: Vec<String> = conn
            .zrangebyscore_limit(self.retry_key(), "-inf", now, 0, limit as isize)
            .await
            .map_err(|e| JobError::Queue(format!("redis ZRANGEBYSCORE: {e}")))?;

        for id in due {
            let removed: i64 = conn
                .zrem(self.retry_key(), &id)
                .await
                .map_err(|e| JobError::Queue(format!("redis ZREM: {e}")))?;
            if removed == 1 {
                conn.lpush::<_, _, ()>(self.ready_key(), &id)
                    .await
                    .map_err(|e| JobError::Queue(format!("redis LPUSH: {e}")))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, envelope: JobEnvelope) -> Result<Uuid, JobError> {
        let job = QueuedJob::new(envelope);
        let mut conn = self.connection().await?;
        self.save(&mut conn, &job).await?;
        conn.lpush::<_, _, ()>(self.ready_key(), job.id.to_string())
            .await
            .map_err(|e| JobError::Queue(format!("redis LPUSH: {e}")))?;
        Ok(job.id)
    }

    async fn fetch_due(&self, limit: usize) -> Result<Vec<QueuedJob>, JobError> {
        let mut conn = self.connection().await?;
        self.promote_due_retries(&mut conn, limit).await?;

        let mut claimed = Vec::new();
        while claimed.len() < limit {
            let id: Option<String> = conn
                .rpop(self.ready_key(), None)
                .await
                .map_err(|e| JobError::Queue(format!("redis RPOP: {e}")))?;
            let Some(id) = id else { break };
            let Ok(id) = id.parse::<Uuid>() else {
                tracing::warn!(raw = %id, "dropping malformed id from ready list");
                continue;
            };
            match self.load(&mut conn, id).await? {
                Some(mut job) => {
                    job.status = JobStatus::Running;
                    self.save(&mut conn, &job).await?;
                    claimed.push(job);
                }
                // Record expired or deleted; nothing to run.
                None => tracing::warn!(job_id = %id, "ready list references missing job record"),
            }
        }
        Ok(claimed)
    }

    async fn mark_succeeded(&self, id: Uuid) -> Result<(), JobError> {
        let mut conn = self.connection().await?;
        if let Some(mut job) = self.load(&mut conn, id).await? {
            job.status = JobStatus::Succeeded;
            job.next_retry_at = None;
            self.save(&mut conn, &job).await?;
            conn.expire::<_, ()>(self.job_key(id), TERMINAL_RECORD_TTL_SECS)
                .await
                .map_err(|e| JobError::Queue(format!("redis EXPIRE: {e}")))?;
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        next_retry_at: OffsetDateTime,
        error: &str,
    ) -> Result<(), JobError> {
        let mut conn = self.connection().await?;
        let Some(mut job) = self.load(&mut conn, id).await? else {
            return Err(JobError::Queue(format!("unknown job {id}")));
        };
        job.status = JobStatus::Failed;
        job.retry_count += 1;
        job.last_error = Some(error.to_string());
        job.next_retry_at = Some(next_retry_at);
        self.save(&mut conn, &job).await?;
        conn.zadd::<_, _, _, ()>(
            self.retry_key(),
            id.to_string(),
            next_retry_at.unix_timestamp(),
        )
        .await
        .map_err(|e| JobError::Queue(format!("redis ZADD: {e}")))
    }

    async fn mark_permanently_failed(&self, id: Uuid, error: &str) -> Result<(), JobError> {
        let mut conn = self.connection().await?;
        if let Some(mut job) = self.load(&mut conn, id).await? {
            job.status = JobStatus::PermanentlyFailed;
            job.last_error = Some(error.to_string());
            job.next_retry_at = None;
            self.save(&mut conn, &job).await?;
            conn.expire::<_, ()>(self.job_key(id), TERMINAL_RECORD_TTL_SECS)
                .await
                .map_err(|e| JobError::Queue(format!("redis EXPIRE: {e}")))?;
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedJob>, JobError> {
        let mut conn = self.connection().await?;
        self.load(&mut conn, id).await
    }

    async fn stats(&self) -> Result<JobStats, JobError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}job:*", self.namespace);
        let mut stats = JobStats::default();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| JobError::Queue(format!("redis SCAN: {e}")))?;

            for key in keys {
                let raw: Option<String> = conn
                    .get(&key)
                    .await
                    .map_err(|e| JobError::Queue(format!("redis GET: {e}")))?;
                if let Some(json) = raw
                    && let Ok(job) = serde_json::from_str::<QueuedJob>(&json)
                {
                    stats.count(job.status);
                }
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(stats)
    }
}
