//! Worker pool: pulls jobs off the queue and runs them with bounded retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::queue::{JobQueue, QueueHandle};
use crate::types::{JobEnvelope, QueuedJob};

/// Result of a successful job execution.
///
/// `follow_ups` lets a job fan out: each envelope is enqueued as an
/// independent job with its own retry budget.
#[derive(Debug, Default)]
pub struct JobOutcome {
    pub follow_ups: Vec<JobEnvelope>,
}

impl JobOutcome {
    /// Plain success, nothing to fan out.
    pub fn done() -> Self {
        Self::default()
    }

    pub fn with_follow_ups(follow_ups: Vec<JobEnvelope>) -> Self {
        Self { follow_ups }
    }
}

/// Executes one job envelope.
///
/// Execution is at-least-once: a runner may see the same envelope again
/// after a crash or retry and must tolerate the duplicate.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &JobEnvelope) -> Result<JobOutcome, JobError>;
}

/// Worker pool sizing and retry policy.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub workers: usize,
    pub poll_interval: Duration,
    /// Jobs claimed per poll, per worker.
    pub batch_size: usize,
    /// Total execution attempts before a job is permanently failed.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// Pool of workers draining a shared queue.
pub struct WorkerPool {
    queue: QueueHandle,
    runner: Arc<dyn JobRunner>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn new(queue: QueueHandle, runner: Arc<dyn JobRunner>, config: WorkerConfig) -> Self {
        Self {
            queue,
            runner,
            config,
        }
    }

    /// Start the pool in background tasks.
    ///
    /// Returns a shutdown sender that stops every worker.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            workers = self.config.workers,
            max_attempts = self.config.max_attempts,
            retry_delay_secs = self.config.retry_delay.as_secs(),
            "Worker pool started"
        );

        for worker_id in 0..self.config.workers.max(1) {
            let queue = self.queue.clone();
            let runner = self.runner.clone();
            let config = self.config.clone();
            let mut shutdown_rx = shutdown_rx.clone();

            tokio::spawn(async move {
                let mut ticker = interval(config.poll_interval);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = process_available(&queue, &runner, &config).await {
                                error!(worker_id, error = %e, "Error draining job queue");
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                info!(worker_id, "Worker shutting down");
                                break;
                            }
                        }
                    }
                }
            });
        }

        shutdown_tx
    }
}

/// Claim one batch of due jobs and process them; returns how many ran.
///
/// Exposed separately from the timer loop so tests (and drain-on-shutdown
/// paths) can drive the queue synchronously.
pub async fn process_available(
    queue: &QueueHandle,
    runner: &Arc<dyn JobRunner>,
    config: &WorkerConfig,
) -> Result<u32, JobError> {
    let due = queue.fetch_due(config.batch_size).await?;
    let mut processed = 0;

    for job in due {
        process_one(queue, runner, config, &job).await;
        processed += 1;
    }
    Ok(processed)
}

async fn process_one(
    queue: &QueueHandle,
    runner: &Arc<dyn JobRunner>,
    config: &WorkerConfig,
    job: &QueuedJob,
) {
    let attempt = job.retry_count + 1;

    match runner.run(&job.envelope).await {
        Ok(outcome) => {
            if let Err(e) = queue.mark_succeeded(job.id).await {
                error!(job_id = %job.id, error = %e, "Failed to acknowledge job");
            }
            info!(
                job_id = %job.id,
                job_kind = %job.envelope.job_kind,
                attempt,
                follow_ups = outcome.follow_ups.len(),
                "Job succeeded"
            );
            for follow_up in outcome.follow_ups {
                if let Err(e) = queue.enqueue(follow_up).await {
                    error!(job_id = %job.id, error = %e, "Failed to enqueue follow-up job");
                }
            }
        }
        Err(e) => {
            let give_up = !e.is_retryable() || attempt >= config.max_attempts;
            if give_up {
                warn!(
                    job_id = %job.id,
                    job_kind = %job.envelope.job_kind,
                    attempt,
                    error = %e,
                    "Job permanently failed"
                );
                if let Err(mark_err) = queue.mark_permanently_failed(job.id, &e.to_string()).await {
                    error!(job_id = %job.id, error = %mark_err, "Failed to record permanent failure");
                }
            } else {
                let next_retry_at = OffsetDateTime::now_utc()
                    + time::Duration::seconds(config.retry_delay.as_secs() as i64);
                warn!(
                    job_id = %job.id,
                    job_kind = %job.envelope.job_kind,
                    attempt,
                    retry_in_secs = config.retry_delay.as_secs(),
                    error = %e,
                    "Job failed, retry scheduled"
                );
                if let Err(mark_err) = queue
                    .schedule_retry(job.id, next_retry_at, &e.to_string())
                    .await
                {
                    error!(job_id = %job.id, error = %mark_err, "Failed to schedule retry");
                }
            }
        }
    }
}
