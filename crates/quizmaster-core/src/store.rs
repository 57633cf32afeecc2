//! Data-store query boundary.
//!
//! Handlers and job runners talk to the relational store exclusively through
//! [`DataStore`]. The trait returns row-like mappings ([`Row`]); the store is
//! free to apply its own transaction discipline, the core layers never hold
//! cross-call locks against it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::StoreError;
use crate::rows::Row;

/// When during the day a user wants quiz reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderSlot {
    Morning,
    Afternoon,
    Evening,
}

impl ReminderSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderSlot::Morning => "morning",
            ReminderSlot::Afternoon => "afternoon",
            ReminderSlot::Evening => "evening",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "morning" => Some(ReminderSlot::Morning),
            "afternoon" => Some(ReminderSlot::Afternoon),
            "evening" => Some(ReminderSlot::Evening),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReminderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating or replacing a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Input for recording a quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScore {
    pub quiz_id: i64,
    pub score: i64,
    pub total: i64,
    /// Seconds the attempt took.
    #[serde(default)]
    pub time_secs: i64,
}

/// Query interface over the relational store.
///
/// All methods are read-committed snapshots or single-statement writes from
/// the caller's point of view.
#[async_trait]
pub trait DataStore: Send + Sync {
    // --- catalog ---

    async fn list_subjects(&self) -> Result<Vec<Row>, StoreError>;

    async fn create_subject(&self, subject: NewSubject) -> Result<Row, StoreError>;

    /// Returns the updated row, or `None` if the subject does not exist.
    async fn update_subject(
        &self,
        subject_id: i64,
        subject: NewSubject,
    ) -> Result<Option<Row>, StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_subject(&self, subject_id: i64) -> Result<bool, StoreError>;

    async fn list_chapters(&self) -> Result<Vec<Row>, StoreError>;

    async fn list_quizzes(&self) -> Result<Vec<Row>, StoreError>;

    // --- users ---

    async fn list_users(&self) -> Result<Vec<Row>, StoreError>;

    async fn find_user(&self, user_id: i64) -> Result<Option<Row>, StoreError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<Row>, StoreError>;

    /// Aggregate view of a user's activity: attempt count, totals, best score.
    async fn user_summary(&self, user_id: i64) -> Result<Option<Row>, StoreError>;

    // --- quiz taking ---

    async fn record_score(&self, user_id: i64, score: NewScore) -> Result<Row, StoreError>;

    /// Score rows for one user whose quiz date falls in `[from, to]`.
    async fn scores_between(
        &self,
        user_id: i64,
        from: Date,
        to: Date,
    ) -> Result<Vec<Row>, StoreError>;

    /// Score rows for all users whose quiz date falls in `[from, to]`.
    async fn all_scores_between(&self, from: Date, to: Date) -> Result<Vec<Row>, StoreError>;

    /// Quizzes the user has not opened yet.
    async fn unviewed_quizzes(&self, user_id: i64) -> Result<Vec<Row>, StoreError>;

    // --- reminder preferences ---

    async fn reminder_preference(&self, user_id: i64) -> Result<Option<ReminderSlot>, StoreError>;

    async fn set_reminder_preference(
        &self,
        user_id: i64,
        slot: ReminderSlot,
    ) -> Result<(), StoreError>;

    /// Returns whether a preference existed.
    async fn clear_reminder_preference(&self, user_id: i64) -> Result<bool, StoreError>;

    /// Users whose reminder preference matches the slot.
    async fn users_with_reminder(&self, slot: ReminderSlot) -> Result<Vec<Row>, StoreError>;
}
