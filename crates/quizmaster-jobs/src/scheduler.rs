//! Cron dispatcher for the static job schedule.
//!
//! A background ticker evaluates each schedule entry against wall-clock time
//! and enqueues a job envelope when an occurrence falls due. The dispatcher
//! never executes jobs itself; execution belongs to the worker pool.

use std::collections::HashMap;
use std::time::Duration;

use croner::Cron;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info};

use crate::error::ScheduleError;
use crate::queue::{JobQueue, QueueHandle};
use crate::types::{JobEnvelope, JobKind};

/// Configuration for the dispatch loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often to check for due entries (in seconds).
    /// Default: 60 seconds (check every minute)
    pub check_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
        }
    }
}

#[derive(Debug)]
struct ScheduleEntry {
    kind: JobKind,
    spec: String,
    cron: Cron,
}

/// The parsed schedule table.
///
/// Parsing happens once, before the server starts serving; a malformed
/// expression aborts startup instead of being skipped at trigger time.
#[derive(Debug)]
pub struct Schedule {
    entries: Vec<ScheduleEntry>,
}

impl Schedule {
    pub fn parse(table: &[(JobKind, String)]) -> Result<Self, ScheduleError> {
        let mut entries = Vec::with_capacity(table.len());
        for (kind, spec) in table {
            let cron = Cron::new(spec)
                .parse()
                .map_err(|e| ScheduleError {
                    kind: *kind,
                    spec: spec.clone(),
                    message: e.to_string(),
                })?;
            entries.push(ScheduleEntry {
                kind: *kind,
                spec: spec.clone(),
                cron,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Dispatcher that enqueues jobs according to their cron schedules.
pub struct CronDispatcher {
    schedule: Schedule,
    queue: QueueHandle,
    config: SchedulerConfig,
    /// Last enqueue time per job kind, to avoid double-firing within a window.
    last_runs: HashMap<JobKind, OffsetDateTime>,
}

impl CronDispatcher {
    pub fn new(schedule: Schedule, queue: QueueHandle, config: SchedulerConfig) -> Self {
        Self {
            schedule,
            queue,
            config,
            last_runs: HashMap::new(),
        }
    }

    /// Start the dispatcher in a background task.
    ///
    /// Returns a shutdown sender that can be used to stop the loop.
    pub fn start(mut self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(
                entries = self.schedule.len(),
                check_interval_secs = self.config.check_interval_secs,
                "Cron dispatcher started"
            );

            let mut ticker = interval(Duration::from_secs(self.config.check_interval_secs));

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick(OffsetDateTime::now_utc()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Cron dispatcher shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn tick(&mut self, now: OffsetDateTime) {
        let window_secs = self.config.check_interval_secs as i64;
        let mut due = Vec::new();

        for entry in &self.schedule.entries {
            let last_run = self.last_runs.get(&entry.kind).copied();
            if should_run(&entry.cron, now, last_run, window_secs) {
                due.push((entry.kind, entry.spec.clone()));
            }
        }

        for (kind, spec) in due {
            self.last_runs.insert(kind, now);
            match self.queue.enqueue(JobEnvelope::new(kind)).await {
                Ok(job_id) => info!(
                    job_kind = %kind,
                    job_id = %job_id,
                    cron = %spec,
                    "Scheduled job enqueued"
                ),
                Err(e) => error!(
                    job_kind = %kind,
                    error = %e,
                    "Failed to enqueue scheduled job"
                ),
            }
        }
    }
}

/// Check whether a cron entry has an occurrence due in the current window.
fn should_run(
    cron: &Cron,
    now: OffsetDateTime,
    last_run: Option<OffsetDateTime>,
    window_secs: i64,
) -> bool {
    // croner works over chrono timestamps
    let now_chrono = match chrono::DateTime::from_timestamp(now.unix_timestamp(), 0) {
        Some(ts) => ts,
        None => return false,
    };

    // Find the most recent scheduled occurrence by searching forward from
    // two windows back.
    let past_time = now_chrono - chrono::Duration::seconds(window_secs * 2);
    let prev = match cron.find_next_occurrence(&past_time, false) {
        Ok(prev) => prev,
        Err(_) => return false,
    };

    let now_ts = now_chrono.timestamp();
    let prev_ts = prev.timestamp();

    // The nearest occurrence is still in the future.
    if prev_ts > now_ts {
        return false;
    }

    // Fresh dispatcher: fire only if the occurrence is within the window,
    // so old occurrences are not replayed on startup.
    let Some(last_run) = last_run else {
        return now_ts - prev_ts < window_secs;
    };

    prev_ts > last_run.unix_timestamp() && now_ts - prev_ts < window_secs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{JobQueue, MemoryQueue};
    use std::sync::Arc;
    use time::macros::datetime;

    fn cron(expr: &str) -> Cron {
        Cron::new(expr).parse().expect("valid cron")
    }

    #[test]
    fn parses_valid_schedule() {
        let table = vec![
            (JobKind::MorningReminder, "0 8 * * *".to_string()),
            (JobKind::EveningReminder, "0 19 * * *".to_string()),
            (JobKind::MonthlyReport, "0 9 1 * *".to_string()),
        ];
        let schedule = Schedule::parse(&table).unwrap();
        assert_eq!(schedule.len(), 3);
    }

    #[test]
    fn rejects_malformed_cron_at_parse_time() {
        let table = vec![(JobKind::EveningReminder, "61 25 * *".to_string())];
        let err = Schedule::parse(&table).unwrap_err();
        assert_eq!(err.kind, JobKind::EveningReminder);
        assert!(err.to_string().contains("evening-reminder"));
    }

    #[test]
    fn occurrence_inside_window_is_due() {
        let c = cron("0 19 * * *");
        let now = datetime!(2026-03-10 19:00:30 UTC);
        assert!(should_run(&c, now, None, 60));
    }

    #[test]
    fn occurrence_outside_window_is_not_due() {
        let c = cron("0 19 * * *");
        let now = datetime!(2026-03-10 18:30:00 UTC);
        assert!(!should_run(&c, now, None, 60));

        // An hour after the occurrence: missed, not replayed.
        let late = datetime!(2026-03-10 20:00:30 UTC);
        assert!(!should_run(&c, late, None, 60));
    }

    #[test]
    fn does_not_fire_twice_for_the_same_occurrence() {
        let c = cron("0 19 * * *");
        let fired_at = datetime!(2026-03-10 19:00:10 UTC);
        assert!(should_run(&c, fired_at, None, 60));

        let next_tick = datetime!(2026-03-10 19:00:50 UTC);
        assert!(!should_run(&c, next_tick, Some(fired_at), 60));
    }

    #[tokio::test]
    async fn tick_enqueues_exactly_one_job_per_due_entry() {
        let queue = Arc::new(MemoryQueue::new());
        let schedule = Schedule::parse(&[(JobKind::EveningReminder, "0 19 * * *".to_string())])
            .unwrap();
        let mut dispatcher =
            CronDispatcher::new(schedule, queue.clone(), SchedulerConfig::default());

        let trigger_time = datetime!(2026-03-10 19:00:05 UTC);
        dispatcher.tick(trigger_time).await;
        dispatcher.tick(trigger_time + time::Duration::seconds(30)).await;

        let due = queue.fetch_due(10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].envelope.job_kind, JobKind::EveningReminder);
    }
}
