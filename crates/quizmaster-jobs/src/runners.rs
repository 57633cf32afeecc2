//! Job runners for the quiz platform's background work.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use time::OffsetDateTime;
use tracing::info;

use quizmaster_core::{
    DataStore, DynDataStore, DynMailer, EmailAttachment, Mailer, OutboundEmail, ReminderSlot, Row,
    get_i64, get_str, month_label, previous_month,
};

use crate::error::JobError;
use crate::templates::TemplateRenderer;
use crate::types::{JobEnvelope, JobKind};
use crate::worker::{JobOutcome, JobRunner};

/// How many quiz titles a reminder lists before truncating.
const REMINDER_TITLE_LIMIT: usize = 3;

/// Executes reminder and report jobs against the data-store and mailer
/// boundaries.
pub struct QuizJobRunner {
    store: DynDataStore,
    mailer: DynMailer,
    templates: TemplateRenderer,
}

impl QuizJobRunner {
    pub fn new(store: DynDataStore, mailer: DynMailer) -> Self {
        Self {
            store,
            mailer,
            templates: TemplateRenderer::with_defaults(),
        }
    }

    async fn send_reminders(&self, slot: ReminderSlot) -> Result<JobOutcome, JobError> {
        let users = self.store.users_with_reminder(slot).await?;
        if users.is_empty() {
            info!(slot = %slot, "No users with this reminder preference");
            return Ok(JobOutcome::done());
        }

        let mut sent = 0;
        for user in &users {
            let Some(uid) = get_i64(user, "uid") else {
                continue;
            };
            let unviewed = self.store.unviewed_quizzes(uid).await?;
            if unviewed.is_empty() {
                continue;
            }

            let Some(email) = get_str(user, "username") else {
                continue;
            };
            let name = get_str(user, "fullname").unwrap_or(email);

            let mut data = HashMap::new();
            data.insert("name".to_string(), json!(name));
            data.insert("count".to_string(), json!(unviewed.len()));
            data.insert("quiz_list".to_string(), json!(quiz_list_html(&unviewed)));

            let rendered = self.templates.render("quiz-reminder", &data)?;
            self.mailer
                .send(OutboundEmail::new(email, rendered.subject, rendered.html))
                .await?;
            sent += 1;
        }

        info!(slot = %slot, sent, "Reminders delivered");
        Ok(JobOutcome::done())
    }

    async fn fan_out_monthly_reports(&self) -> Result<JobOutcome, JobError> {
        let users = self.store.list_users().await?;
        let follow_ups: Vec<JobEnvelope> = users
            .iter()
            .filter_map(|user| get_i64(user, "uid"))
            .map(|uid| JobEnvelope::for_target(JobKind::UserExport, uid))
            .collect();

        info!(count = follow_ups.len(), "Fanning out per-user report jobs");
        Ok(JobOutcome::with_follow_ups(follow_ups))
    }

    async fn export_user_report(&self, user_id: i64) -> Result<JobOutcome, JobError> {
        let Some(user) = self.store.find_user(user_id).await? else {
            // The user disappeared between fan-out and execution.
            info!(user_id, "Skipping report for unknown user");
            return Ok(JobOutcome::done());
        };

        let (from, to) = previous_month(OffsetDateTime::now_utc());
        let scores = self.store.scores_between(user_id, from, to).await?;
        if scores.is_empty() {
            info!(user_id, "No activity last month, skipping report");
            return Ok(JobOutcome::done());
        }

        let attempts = scores.len() as i64;
        let total_score: i64 = scores.iter().filter_map(|s| get_i64(s, "score")).sum();
        let total_possible: i64 = scores.iter().filter_map(|s| get_i64(s, "total")).sum();
        let best_score = scores
            .iter()
            .filter_map(|s| get_i64(s, "score"))
            .max()
            .unwrap_or(0);
        let time_spent_secs: i64 = scores.iter().filter_map(|s| get_i64(s, "time_secs")).sum();
        let average_pct = if total_possible > 0 {
            (total_score as f64 / total_possible as f64) * 100.0
        } else {
            0.0
        };

        let all_scores = self.store.all_scores_between(from, to).await?;
        let rank = rank_among(&all_scores, user_id);

        let Some(email) = get_str(&user, "username") else {
            return Ok(JobOutcome::done());
        };
        let name = get_str(&user, "fullname").unwrap_or(email);
        let month = month_label(from);

        let mut data = HashMap::new();
        data.insert("name".to_string(), json!(name));
        data.insert("month".to_string(), json!(month));
        data.insert("attempts".to_string(), json!(attempts));
        data.insert("total_score".to_string(), json!(total_score));
        data.insert("total_possible".to_string(), json!(total_possible));
        data.insert(
            "average_pct".to_string(),
            json!(format!("{average_pct:.1}")),
        );
        data.insert("best_score".to_string(), json!(best_score));
        data.insert("rank".to_string(), json!(rank));
        data.insert("time_spent_mins".to_string(), json!(time_spent_secs / 60));

        let rendered = self.templates.render("monthly-report", &data)?;
        let attachment = EmailAttachment {
            filename: format!("quiz_activity_{user_id}.csv"),
            content_type: "text/csv".to_string(),
            data: scores_csv(&scores).into_bytes(),
        };

        self.mailer
            .send(
                OutboundEmail::new(email, rendered.subject, rendered.html)
                    .with_attachment(attachment),
            )
            .await?;

        info!(user_id, attempts, "Monthly report delivered");
        Ok(JobOutcome::done())
    }
}

#[async_trait]
impl JobRunner for QuizJobRunner {
    async fn run(&self, job: &JobEnvelope) -> Result<JobOutcome, JobError> {
        match job.job_kind {
            JobKind::MorningReminder | JobKind::AfternoonReminder | JobKind::EveningReminder => {
                // reminder_slot is Some for every reminder kind
                let slot = job
                    .job_kind
                    .reminder_slot()
                    .unwrap_or(ReminderSlot::Morning);
                self.send_reminders(slot).await
            }
            JobKind::MonthlyReport => self.fan_out_monthly_reports().await,
            JobKind::UserExport => {
                let user_id = job
                    .target_id
                    .ok_or(JobError::MissingTarget(JobKind::UserExport))?;
                self.export_user_report(user_id).await
            }
        }
    }
}

fn quiz_list_html(quizzes: &[Row]) -> String {
    let mut html = String::new();
    for quiz in quizzes.iter().take(REMINDER_TITLE_LIMIT) {
        if let Some(title) = get_str(quiz, "quiz_name") {
            html.push_str(&format!("<li>{title}</li>"));
        }
    }
    if quizzes.len() > REMINDER_TITLE_LIMIT {
        html.push_str(&format!(
            "<li>...and {} more</li>",
            quizzes.len() - REMINDER_TITLE_LIMIT
        ));
    }
    html
}

/// 1-based rank of `user_id` by percentage score across all users' rows.
fn rank_among(all_scores: &[Row], user_id: i64) -> usize {
    let mut totals: HashMap<i64, (i64, i64)> = HashMap::new();
    for row in all_scores {
        let Some(uid) = get_i64(row, "uid") else {
            continue;
        };
        let entry = totals.entry(uid).or_insert((0, 0));
        entry.0 += get_i64(row, "score").unwrap_or(0);
        entry.1 += get_i64(row, "total").unwrap_or(0);
    }

    let mut ranking: Vec<(i64, f64)> = totals
        .into_iter()
        .filter(|(_, (_, possible))| *possible > 0)
        .map(|(uid, (score, possible))| (uid, score as f64 / possible as f64))
        .collect();
    ranking.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    ranking
        .iter()
        .position(|(uid, _)| *uid == user_id)
        .map(|i| i + 1)
        .unwrap_or(0)
}

fn scores_csv(scores: &[Row]) -> String {
    let mut csv = String::from("quiz_id,quiz_date,score,total,time_secs\n");
    for row in scores {
        csv.push_str(&format!(
            "{},{},{},{},{}\n",
            get_i64(row, "quiz_id").unwrap_or(0),
            get_str(row, "quiz_date").unwrap_or(""),
            get_i64(row, "score").unwrap_or(0),
            get_i64(row, "total").unwrap_or(0),
            get_i64(row, "time_secs").unwrap_or(0),
        ));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizmaster_core::{DataStore, MemoryDataStore, MemoryMailer, NewScore, format_date};
    use std::sync::Arc;

    fn runner_with(
        store: Arc<MemoryDataStore>,
        mailer: Arc<MemoryMailer>,
    ) -> QuizJobRunner {
        QuizJobRunner::new(store, mailer)
    }

    #[tokio::test]
    async fn reminder_emails_users_with_unviewed_quizzes() {
        let store = Arc::new(MemoryDataStore::new());
        let mailer = Arc::new(MemoryMailer::new());

        let ada = store.insert_user("ada@example.com", "Ada");
        let bob = store.insert_user("bob@example.com", "Bob");
        let chapter = store.insert_chapter(1, "Ch 1");
        let quiz = store.insert_quiz(chapter, "Kinematics", "2026-07-05");

        store
            .set_reminder_preference(ada, ReminderSlot::Evening)
            .await
            .unwrap();
        store
            .set_reminder_preference(bob, ReminderSlot::Evening)
            .await
            .unwrap();
        // Bob already viewed the only quiz, so only Ada gets mail.
        store.mark_viewed(bob, quiz);

        let runner = runner_with(store, mailer.clone());
        runner
            .run(&JobEnvelope::new(JobKind::EveningReminder))
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipients, vec!["ada@example.com".to_string()]);
        assert!(sent[0].subject.contains('1'));
        assert!(sent[0].html_body.contains("Kinematics"));
    }

    #[tokio::test]
    async fn monthly_report_fans_out_one_export_per_user() {
        let store = Arc::new(MemoryDataStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        for i in 0..3 {
            store.insert_user(&format!("u{i}@example.com"), "U");
        }

        let runner = runner_with(store, mailer);
        let outcome = runner
            .run(&JobEnvelope::new(JobKind::MonthlyReport))
            .await
            .unwrap();

        assert_eq!(outcome.follow_ups.len(), 3);
        assert!(
            outcome
                .follow_ups
                .iter()
                .all(|f| f.job_kind == JobKind::UserExport && f.target_id.is_some())
        );
    }

    #[tokio::test]
    async fn user_export_attaches_csv_of_last_months_activity() {
        let store = Arc::new(MemoryDataStore::new());
        let mailer = Arc::new(MemoryMailer::new());

        let ada = store.insert_user("ada@example.com", "Ada");
        let chapter = store.insert_chapter(1, "Ch 1");
        let (first, _) = previous_month(OffsetDateTime::now_utc());
        let quiz = store.insert_quiz(chapter, "Optics", &format_date(first));
        store
            .record_score(
                ada,
                NewScore {
                    quiz_id: quiz,
                    score: 8,
                    total: 10,
                    time_secs: 120,
                },
            )
            .await
            .unwrap();

        let runner = runner_with(store, mailer.clone());
        runner
            .run(&JobEnvelope::for_target(JobKind::UserExport, ada))
            .await
            .unwrap();

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        let attachment = sent[0].attachment.as_ref().unwrap();
        assert_eq!(attachment.content_type, "text/csv");
        let csv = String::from_utf8(attachment.data.clone()).unwrap();
        assert!(csv.starts_with("quiz_id,quiz_date,score,total,time_secs"));
        assert!(csv.contains(",8,10,120"));
        assert!(sent[0].html_body.contains("80.0"));
    }

    #[tokio::test]
    async fn user_export_without_activity_is_a_quiet_success() {
        let store = Arc::new(MemoryDataStore::new());
        let mailer = Arc::new(MemoryMailer::new());
        let ada = store.insert_user("ada@example.com", "Ada");

        let runner = runner_with(store, mailer.clone());
        runner
            .run(&JobEnvelope::for_target(JobKind::UserExport, ada))
            .await
            .unwrap();

        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn user_export_without_target_is_rejected() {
        let store = Arc::new(MemoryDataStore::new());
        let mailer = Arc::new(MemoryMailer::new());

        let runner = runner_with(store, mailer);
        let err = runner
            .run(&JobEnvelope::new(JobKind::UserExport))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn rank_orders_users_by_percentage() {
        use quizmaster_core::object;
        use serde_json::json;

        let rows: Vec<Row> = vec![
            object(json!({"uid": 1, "score": 5, "total": 10})),
            object(json!({"uid": 2, "score": 9, "total": 10})),
            object(json!({"uid": 3, "score": 2, "total": 10})),
        ];
        assert_eq!(rank_among(&rows, 2), 1);
        assert_eq!(rank_among(&rows, 1), 2);
        assert_eq!(rank_among(&rows, 3), 3);
        assert_eq!(rank_among(&rows, 99), 0);
    }
}
