//! In-memory data store.
//!
//! Backs single-instance deployments and tests. Tables are concurrent maps
//! keyed by integer id; rows are materialized as JSON objects on read so the
//! trait surface matches what a relational backend would return.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use time::{Date, OffsetDateTime};

use crate::error::StoreError;
use crate::rows::{Row, get_str, object};
use crate::store::{DataStore, NewScore, NewSubject, ReminderSlot};
use crate::time_util::format_date;

#[derive(Debug, Clone)]
struct ScoreRecord {
    user_id: i64,
    quiz_id: i64,
    score: i64,
    total: i64,
    time_secs: i64,
    quiz_date: String,
}

/// Concurrent in-memory implementation of [`DataStore`].
#[derive(Default)]
pub struct MemoryDataStore {
    users: DashMap<i64, Row>,
    subjects: DashMap<i64, Row>,
    chapters: DashMap<i64, Row>,
    quizzes: DashMap<i64, Row>,
    scores: Mutex<Vec<ScoreRecord>>,
    viewed: Mutex<HashSet<(i64, i64)>>,
    reminders: DashMap<i64, ReminderSlot>,
    next_id: AtomicI64,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed).max(1)
    }

    // Seed helpers for bootstrap and tests.

    pub fn insert_user(&self, username: &str, fullname: &str) -> i64 {
        let uid = self.allocate_id();
        self.users.insert(
            uid,
            object(json!({"uid": uid, "username": username, "fullname": fullname})),
        );
        uid
    }

    pub fn insert_chapter(&self, subject_id: i64, name: &str) -> i64 {
        let chapter_id = self.allocate_id();
        self.chapters.insert(
            chapter_id,
            object(json!({"chapter_id": chapter_id, "subject_id": subject_id, "name": name})),
        );
        chapter_id
    }

    pub fn insert_quiz(&self, chapter_id: i64, name: &str, quiz_date: &str) -> i64 {
        let quiz_id = self.allocate_id();
        self.quizzes.insert(
            quiz_id,
            object(json!({
                "quiz_id": quiz_id,
                "chapter_id": chapter_id,
                "quiz_name": name,
                "quiz_date": quiz_date,
            })),
        );
        quiz_id
    }

    pub fn mark_viewed(&self, user_id: i64, quiz_id: i64) {
        if let Ok(mut viewed) = self.viewed.lock() {
            viewed.insert((user_id, quiz_id));
        }
    }

    fn sorted_rows(table: &DashMap<i64, Row>) -> Vec<Row> {
        let mut rows: Vec<(i64, Row)> = table
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        rows.sort_by_key(|(id, _)| *id);
        rows.into_iter().map(|(_, row)| row).collect()
    }

    fn score_row(record: &ScoreRecord) -> Row {
        object(json!({
            "uid": record.user_id,
            "quiz_id": record.quiz_id,
            "score": record.score,
            "total": record.total,
            "time_secs": record.time_secs,
            "quiz_date": record.quiz_date,
        }))
    }

    fn scores_snapshot(&self) -> Result<Vec<ScoreRecord>, StoreError> {
        self.scores
            .lock()
            .map(|scores| scores.clone())
            .map_err(|_| StoreError::Unavailable("score table lock poisoned".into()))
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn list_subjects(&self) -> Result<Vec<Row>, StoreError> {
        Ok(Self::sorted_rows(&self.subjects))
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<Row, StoreError> {
        if subject.name.trim().is_empty() {
            return Err(StoreError::Invalid("subject name must not be empty".into()));
        }
        let subject_id = self.allocate_id();
        let row = object(json!({
            "subject_id": subject_id,
            "name": subject.name,
            "description": subject.description,
        }));
        self.subjects.insert(subject_id, row.clone());
        Ok(row)
    }

    async fn update_subject(
        &self,
        subject_id: i64,
        subject: NewSubject,
    ) -> Result<Option<Row>, StoreError> {
        match self.subjects.get_mut(&subject_id) {
            Some(mut entry) => {
                entry.insert("name".into(), json!(subject.name));
                entry.insert("description".into(), json!(subject.description));
                Ok(Some(entry.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_subject(&self, subject_id: i64) -> Result<bool, StoreError> {
        Ok(self.subjects.remove(&subject_id).is_some())
    }

    async fn list_chapters(&self) -> Result<Vec<Row>, StoreError> {
        Ok(Self::sorted_rows(&self.chapters))
    }

    async fn list_quizzes(&self) -> Result<Vec<Row>, StoreError> {
        Ok(Self::sorted_rows(&self.quizzes))
    }

    async fn list_users(&self) -> Result<Vec<Row>, StoreError> {
        Ok(Self::sorted_rows(&self.users))
    }

    async fn find_user(&self, user_id: i64) -> Result<Option<Row>, StoreError> {
        Ok(self.users.get(&user_id).map(|entry| entry.clone()))
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<Row>, StoreError> {
        Ok(self
            .users
            .iter()
            .find(|entry| get_str(entry.value(), "username") == Some(username))
            .map(|entry| entry.value().clone()))
    }

    async fn user_summary(&self, user_id: i64) -> Result<Option<Row>, StoreError> {
        if !self.users.contains_key(&user_id) {
            return Ok(None);
        }
        let scores = self.scores_snapshot()?;
        let mine: Vec<&ScoreRecord> = scores.iter().filter(|s| s.user_id == user_id).collect();

        let attempts = mine.len() as i64;
        let total_score: i64 = mine.iter().map(|s| s.score).sum();
        let total_possible: i64 = mine.iter().map(|s| s.total).sum();
        let best_score = mine.iter().map(|s| s.score).max().unwrap_or(0);
        let average_pct = if total_possible > 0 {
            (total_score as f64 / total_possible as f64) * 100.0
        } else {
            0.0
        };

        Ok(Some(object(json!({
            "uid": user_id,
            "attempts": attempts,
            "total_score": total_score,
            "total_possible": total_possible,
            "best_score": best_score,
            "average_pct": average_pct,
        }))))
    }

    async fn record_score(&self, user_id: i64, score: NewScore) -> Result<Row, StoreError> {
        if score.total <= 0 || score.score < 0 || score.score > score.total {
            return Err(StoreError::Invalid("score out of range".into()));
        }
        let quiz_date = self
            .quizzes
            .get(&score.quiz_id)
            .and_then(|quiz| get_str(&quiz, "quiz_date").map(str::to_string))
            .unwrap_or_else(|| format_date(OffsetDateTime::now_utc().date()));

        let record = ScoreRecord {
            user_id,
            quiz_id: score.quiz_id,
            score: score.score,
            total: score.total,
            time_secs: score.time_secs,
            quiz_date,
        };
        let row = Self::score_row(&record);
        self.scores
            .lock()
            .map_err(|_| StoreError::Unavailable("score table lock poisoned".into()))?
            .push(record);
        Ok(row)
    }

    async fn scores_between(
        &self,
        user_id: i64,
        from: Date,
        to: Date,
    ) -> Result<Vec<Row>, StoreError> {
        let (from, to) = (format_date(from), format_date(to));
        Ok(self
            .scores_snapshot()?
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| s.quiz_date.as_str() >= from.as_str() && s.quiz_date.as_str() <= to.as_str())
            .map(Self::score_row)
            .collect())
    }

    async fn all_scores_between(&self, from: Date, to: Date) -> Result<Vec<Row>, StoreError> {
        let (from, to) = (format_date(from), format_date(to));
        Ok(self
            .scores_snapshot()?
            .iter()
            .filter(|s| s.quiz_date.as_str() >= from.as_str() && s.quiz_date.as_str() <= to.as_str())
            .map(Self::score_row)
            .collect())
    }

    async fn unviewed_quizzes(&self, user_id: i64) -> Result<Vec<Row>, StoreError> {
        let viewed = self
            .viewed
            .lock()
            .map_err(|_| StoreError::Unavailable("viewed table lock poisoned".into()))?
            .clone();
        Ok(Self::sorted_rows(&self.quizzes)
            .into_iter()
            .filter(|quiz| {
                crate::rows::get_i64(quiz, "quiz_id")
                    .map(|quiz_id| !viewed.contains(&(user_id, quiz_id)))
                    .unwrap_or(false)
            })
            .collect())
    }

    async fn reminder_preference(&self, user_id: i64) -> Result<Option<ReminderSlot>, StoreError> {
        Ok(self.reminders.get(&user_id).map(|entry| *entry.value()))
    }

    async fn set_reminder_preference(
        &self,
        user_id: i64,
        slot: ReminderSlot,
    ) -> Result<(), StoreError> {
        self.reminders.insert(user_id, slot);
        Ok(())
    }

    async fn clear_reminder_preference(&self, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.reminders.remove(&user_id).is_some())
    }

    async fn users_with_reminder(&self, slot: ReminderSlot) -> Result<Vec<Row>, StoreError> {
        let mut users: Vec<Row> = self
            .reminders
            .iter()
            .filter(|entry| *entry.value() == slot)
            .filter_map(|entry| self.users.get(entry.key()).map(|user| user.clone()))
            .collect();
        users.sort_by_key(|user| crate::rows::get_i64(user, "uid").unwrap_or(0));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::get_i64;

    #[tokio::test]
    async fn subject_crud_roundtrip() {
        let store = MemoryDataStore::new();
        let created = store
            .create_subject(NewSubject {
                name: "Physics".into(),
                description: "Mechanics and waves".into(),
            })
            .await
            .unwrap();
        let id = get_i64(&created, "subject_id").unwrap();

        assert_eq!(store.list_subjects().await.unwrap().len(), 1);

        let updated = store
            .update_subject(
                id,
                NewSubject {
                    name: "Physics II".into(),
                    description: String::new(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(get_str(&updated, "name"), Some("Physics II"));

        assert!(store.delete_subject(id).await.unwrap());
        assert!(store.list_subjects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unviewed_quizzes_excludes_viewed() {
        let store = MemoryDataStore::new();
        let uid = store.insert_user("a@example.com", "A");
        let chapter = store.insert_chapter(1, "Ch 1");
        let q1 = store.insert_quiz(chapter, "Quiz 1", "2026-07-01");
        let _q2 = store.insert_quiz(chapter, "Quiz 2", "2026-07-02");

        store.mark_viewed(uid, q1);
        let unviewed = store.unviewed_quizzes(uid).await.unwrap();
        assert_eq!(unviewed.len(), 1);
        assert_eq!(get_str(&unviewed[0], "quiz_name"), Some("Quiz 2"));
    }

    #[tokio::test]
    async fn summary_aggregates_scores() {
        let store = MemoryDataStore::new();
        let uid = store.insert_user("a@example.com", "A");
        let chapter = store.insert_chapter(1, "Ch 1");
        let quiz = store.insert_quiz(chapter, "Quiz", "2026-07-01");

        for (score, total) in [(4, 5), (9, 10)] {
            store
                .record_score(
                    uid,
                    NewScore {
                        quiz_id: quiz,
                        score,
                        total,
                        time_secs: 30,
                    },
                )
                .await
                .unwrap();
        }

        let summary = store.user_summary(uid).await.unwrap().unwrap();
        assert_eq!(get_i64(&summary, "attempts"), Some(2));
        assert_eq!(get_i64(&summary, "total_score"), Some(13));
        assert_eq!(get_i64(&summary, "best_score"), Some(9));
    }

    #[tokio::test]
    async fn rejects_out_of_range_score() {
        let store = MemoryDataStore::new();
        let uid = store.insert_user("a@example.com", "A");
        let result = store
            .record_score(
                uid,
                NewScore {
                    quiz_id: 1,
                    score: 6,
                    total: 5,
                    time_secs: 0,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[tokio::test]
    async fn reminder_preferences_filter_users() {
        let store = MemoryDataStore::new();
        let a = store.insert_user("a@example.com", "A");
        let b = store.insert_user("b@example.com", "B");
        store.set_reminder_preference(a, ReminderSlot::Evening).await.unwrap();
        store.set_reminder_preference(b, ReminderSlot::Morning).await.unwrap();

        let evening = store.users_with_reminder(ReminderSlot::Evening).await.unwrap();
        assert_eq!(evening.len(), 1);
        assert_eq!(get_i64(&evening[0], "uid"), Some(a));

        assert!(store.clear_reminder_preference(a).await.unwrap());
        assert!(!store.clear_reminder_preference(a).await.unwrap());
    }
}
