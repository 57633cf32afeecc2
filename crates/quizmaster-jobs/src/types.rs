use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use quizmaster_core::ReminderSlot;

/// The kinds of background work the platform schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    MorningReminder,
    AfternoonReminder,
    EveningReminder,
    MonthlyReport,
    UserExport,
}

impl JobKind {
    /// The reminder slot this kind targets, if it is a reminder job.
    pub fn reminder_slot(&self) -> Option<ReminderSlot> {
        match self {
            JobKind::MorningReminder => Some(ReminderSlot::Morning),
            JobKind::AfternoonReminder => Some(ReminderSlot::Afternoon),
            JobKind::EveningReminder => Some(ReminderSlot::Evening),
            JobKind::MonthlyReport | JobKind::UserExport => None,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobKind::MorningReminder => "morning-reminder",
            JobKind::AfternoonReminder => "afternoon-reminder",
            JobKind::EveningReminder => "evening-reminder",
            JobKind::MonthlyReport => "monthly-report",
            JobKind::UserExport => "user-export",
        };
        f.write_str(s)
    }
}

/// Job status as tracked by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue for a worker.
    Pending,
    /// Claimed by exactly one worker.
    Running,
    Succeeded,
    /// Failed with retry budget remaining; `next_retry_at` is set.
    Failed,
    /// Retry budget exhausted or the error was not retryable.
    PermanentlyFailed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::PermanentlyFailed => "permanently_failed",
        };
        f.write_str(s)
    }
}

/// The wire shape of a job: what producers enqueue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_kind: JobKind,
    /// The user the job targets, for per-user jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl JobEnvelope {
    pub fn new(job_kind: JobKind) -> Self {
        Self {
            job_kind,
            target_id: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn for_target(job_kind: JobKind, target_id: i64) -> Self {
        Self {
            job_kind,
            target_id: Some(target_id),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

/// A job as tracked by the queue: the envelope plus attempt bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub envelope: JobEnvelope,
    pub status: JobStatus,
    /// Number of retries scheduled so far; the first execution runs with 0.
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub next_retry_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
}

impl QueuedJob {
    pub fn new(envelope: JobEnvelope) -> Self {
        Self {
            id: Uuid::new_v4(),
            envelope,
            status: JobStatus::Pending,
            retry_count: 0,
            last_error: None,
            next_retry_at: None,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Queue counters by status, for the admin surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: u32,
    pub running: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub permanently_failed: u32,
}

impl JobStats {
    pub fn count(&mut self, status: JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Succeeded => self.succeeded += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::PermanentlyFailed => self.permanently_failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_wire_format_is_kebab_case() {
        let serialized = serde_json::to_string(&JobKind::EveningReminder).unwrap();
        assert_eq!(serialized, "\"evening-reminder\"");

        let parsed: JobKind = serde_json::from_str("\"user-export\"").unwrap();
        assert_eq!(parsed, JobKind::UserExport);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = JobEnvelope::for_target(JobKind::UserExport, 7);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["job_kind"], "user-export");
        assert_eq!(value["target_id"], 7);
        assert!(value["created_at"].is_string());
    }

    #[test]
    fn reminder_slots_map_to_reminder_kinds_only() {
        use quizmaster_core::ReminderSlot;
        assert_eq!(
            JobKind::MorningReminder.reminder_slot(),
            Some(ReminderSlot::Morning)
        );
        assert_eq!(JobKind::MonthlyReport.reminder_slot(), None);
    }
}
