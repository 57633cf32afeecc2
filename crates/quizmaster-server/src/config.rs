use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use quizmaster_jobs::types::JobKind;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Identity configuration (JWT verification for cache scoping)
    #[serde(default)]
    pub auth: AuthConfig,
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheSettings,
    /// SMTP relay configuration
    #[serde(default)]
    pub smtp: SmtpSettings,
    /// Worker pool configuration
    #[serde(default)]
    pub jobs: JobSettings,
    /// Cron schedule per job kind
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Cache validations
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        // Job validations
        if self.jobs.workers == 0 {
            return Err("jobs.workers must be > 0".into());
        }
        if self.jobs.max_attempts == 0 {
            return Err("jobs.max_attempts must be > 0".into());
        }
        // Schedule entries must be present; cron syntax is checked when the
        // schedule table is parsed at bootstrap.
        for (kind, spec) in self.schedule.entries() {
            if spec.trim().is_empty() {
                return Err(format!("schedule entry for {kind} must not be empty"));
            }
        }
        // SMTP validation
        if self.smtp.enabled {
            if self.smtp.host.is_empty() {
                return Err("smtp.enabled=true requires smtp.host".into());
            }
            if self.smtp.from.is_empty() {
                return Err("smtp.enabled=true requires smtp.from".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], default_port())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Identity settings. Verification only: token issuance lives elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HS256 secret for access-token verification. When unset, every
    /// request is treated as anonymous.
    #[serde(default)]
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades without it)
    /// Default: false (disabled for single-instance deployments)
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Default TTL for cached responses, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Prefix prepended to response-cache keys
    #[serde(default = "default_cache_key_prefix")]
    pub key_prefix: String,

    /// Namespace prefix applied by the Redis store to every key
    #[serde(default = "default_cache_namespace")]
    pub namespace: String,
}

fn default_cache_ttl_secs() -> u64 {
    300 // 5 minutes
}
fn default_cache_key_prefix() -> String {
    "views_".into()
}
fn default_cache_namespace() -> String {
    "quizmaster_".into()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl_secs(),
            key_prefix: default_cache_key_prefix(),
            namespace: default_cache_namespace(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Send real mail. When false, outbound messages are logged and dropped.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

fn default_smtp_host() -> String {
    "localhost".into()
}
fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "quizmaster@example.com".into()
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_smtp_from(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSettings {
    /// Run the scheduler and worker pool in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_job_workers")]
    pub workers: usize,
    #[serde(default = "default_job_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_job_batch")]
    pub batch_size: usize,
    /// Total execution attempts before a job is permanently failed
    #[serde(default = "default_job_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts, in seconds
    #[serde(default = "default_job_retry_secs")]
    pub retry_delay_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_job_workers() -> usize {
    2
}
fn default_job_poll_secs() -> u64 {
    5
}
fn default_job_batch() -> usize {
    10
}
fn default_job_attempts() -> u32 {
    3
}
fn default_job_retry_secs() -> u64 {
    60
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: default_job_workers(),
            poll_interval_secs: default_job_poll_secs(),
            batch_size: default_job_batch(),
            max_attempts: default_job_attempts(),
            retry_delay_secs: default_job_retry_secs(),
        }
    }
}

/// Cron specs per job kind (minute hour day-of-month month day-of-week).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_morning_cron")]
    pub morning_reminder: String,
    #[serde(default = "default_afternoon_cron")]
    pub afternoon_reminder: String,
    #[serde(default = "default_evening_cron")]
    pub evening_reminder: String,
    #[serde(default = "default_monthly_cron")]
    pub monthly_report: String,
}

fn default_morning_cron() -> String {
    "0 8 * * *".into()
}
fn default_afternoon_cron() -> String {
    "0 13 * * *".into()
}
fn default_evening_cron() -> String {
    "0 19 * * *".into()
}
fn default_monthly_cron() -> String {
    "0 9 1 * *".into()
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            morning_reminder: default_morning_cron(),
            afternoon_reminder: default_afternoon_cron(),
            evening_reminder: default_evening_cron(),
            monthly_report: default_monthly_cron(),
        }
    }
}

impl ScheduleSettings {
    /// The static trigger table handed to the dispatcher at bootstrap.
    pub fn entries(&self) -> Vec<(JobKind, String)> {
        vec![
            (JobKind::MorningReminder, self.morning_reminder.clone()),
            (JobKind::AfternoonReminder, self.afternoon_reminder.clone()),
            (JobKind::EveningReminder, self.evening_reminder.clone()),
            (JobKind::MonthlyReport, self.monthly_report.clone()),
        ]
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("quizmaster.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., QUIZMASTER__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("QUIZMASTER")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.cache.default_ttl_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn schedule_table_covers_all_static_kinds() {
        let entries = ScheduleSettings::default().entries();
        assert_eq!(entries.len(), 4);
        assert!(entries.iter().any(|(k, _)| *k == JobKind::MonthlyReport));
    }
}
