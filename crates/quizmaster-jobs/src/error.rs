use thiserror::Error;

use crate::types::JobKind;
use quizmaster_core::{MailError, StoreError};

/// Errors raised while executing or queueing jobs.
///
/// The worker loop inspects the error kind to decide between retry and
/// permanent failure; runners return these instead of panicking.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("data store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("email delivery failed: {0}")]
    SendFailed(String),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("{0} job requires a target id")]
    MissingTarget(JobKind),

    #[error("email template not found: {0}")]
    TemplateNotFound(String),
}

impl JobError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Malformed jobs and missing templates fail the same way every attempt;
    /// infrastructure errors are worth the retry budget.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::StoreUnavailable(_) | JobError::SendFailed(_) | JobError::Queue(_) => true,
            JobError::MissingTarget(_) | JobError::TemplateNotFound(_) => false,
        }
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

impl From<MailError> for JobError {
    fn from(err: MailError) -> Self {
        JobError::SendFailed(err.to_string())
    }
}

/// A malformed cron expression in the schedule table.
///
/// Raised once at startup; the process refuses to boot with a bad schedule.
#[derive(Debug, Error)]
#[error("invalid cron expression `{spec}` for {kind}: {message}")]
pub struct ScheduleError {
    pub kind: JobKind,
    pub spec: String,
    pub message: String,
}
