//! Scheduled job system for Quizmaster.
//!
//! A cron-driven dispatcher enqueues job envelopes onto a [`JobQueue`]; a
//! pool of workers pulls them, executes them through a [`JobRunner`] and
//! retries transient failures with a fixed backoff until the attempt budget
//! is exhausted. Delivery is at-least-once: runners must tolerate duplicate
//! execution.

pub mod email;
pub mod error;
pub mod queue;
pub mod redis_queue;
pub mod runners;
pub mod scheduler;
pub mod templates;
pub mod types;
pub mod worker;

pub use email::{SmtpConfig, SmtpMailer};
pub use error::{JobError, ScheduleError};
pub use queue::{JobQueue, MemoryQueue, QueueHandle};
pub use redis_queue::RedisQueue;
pub use runners::QuizJobRunner;
pub use scheduler::{CronDispatcher, Schedule, SchedulerConfig};
pub use templates::{EmailTemplate, RenderedEmail, TemplateRenderer};
pub use types::{JobEnvelope, JobKind, JobStats, JobStatus, QueuedJob};
pub use worker::{JobOutcome, JobRunner, WorkerConfig, WorkerPool};
