//! Server bootstrap: construct the store, cache and queue once, wire the
//! router, and start the scheduler and worker pool alongside the listener.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tokio::sync::watch;

use quizmaster_core::{DynMailer, MemoryDataStore, NoopMailer};
use quizmaster_jobs::{
    CronDispatcher, MemoryQueue, QuizJobRunner, RedisQueue, Schedule, ScheduleError,
    SchedulerConfig, SmtpConfig, SmtpMailer, WorkerConfig, WorkerPool,
};

use crate::cache::{CacheHandle, MemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("redis pool creation failed: {0}")]
    Redis(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("smtp setup failed: {0}")]
    Smtp(String),

    #[error("bind failed: {0}")]
    Bind(std::io::Error),
}

/// Shutdown handles for the background loops.
pub struct BackgroundTasks {
    pub dispatcher: Option<watch::Sender<bool>>,
    pub workers: Option<watch::Sender<bool>>,
}

impl BackgroundTasks {
    pub fn shutdown(&self) {
        if let Some(dispatcher) = &self.dispatcher {
            let _ = dispatcher.send(true);
        }
        if let Some(workers) = &self.workers {
            let _ = workers.send(true);
        }
    }
}

/// Build the shared state: one store, one cache, one queue per process.
pub fn build_state(cfg: &AppConfig) -> Result<AppState, BootstrapError> {
    let store = Arc::new(MemoryDataStore::new());

    let (cache, queue): (CacheHandle, quizmaster_jobs::QueueHandle) = if cfg.redis.enabled {
        let pool = deadpool_redis::Config::from_url(cfg.redis.url.clone())
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| BootstrapError::Redis(e.to_string()))?;
        tracing::info!(url = %cfg.redis.url, "Redis cache and durable job queue enabled");
        (
            Arc::new(RedisCache::new(pool.clone(), cfg.cache.namespace.clone())),
            Arc::new(RedisQueue::new(pool, cfg.cache.namespace.clone())),
        )
    } else {
        tracing::info!("Running with in-process cache and job queue");
        (Arc::new(MemoryCache::new()), Arc::new(MemoryQueue::new()))
    };

    Ok(AppState::new(store, cache, queue, Arc::new(cfg.clone())))
}

/// Start the cron dispatcher and worker pool.
///
/// The schedule table is parsed here; a malformed cron expression aborts
/// startup instead of being discovered at trigger time.
pub fn start_background(
    state: &AppState,
    cfg: &AppConfig,
) -> Result<BackgroundTasks, BootstrapError> {
    if !cfg.jobs.enabled {
        tracing::info!("Background jobs disabled by configuration");
        return Ok(BackgroundTasks {
            dispatcher: None,
            workers: None,
        });
    }

    let schedule = Schedule::parse(&cfg.schedule.entries())?;
    let dispatcher = CronDispatcher::new(
        schedule,
        state.queue.clone(),
        SchedulerConfig::default(),
    )
    .start();

    let mailer: DynMailer = if cfg.smtp.enabled {
        let smtp = SmtpMailer::new(&SmtpConfig {
            host: cfg.smtp.host.clone(),
            port: cfg.smtp.port,
            username: cfg.smtp.username.clone(),
            password: cfg.smtp.password.clone(),
            from: cfg.smtp.from.clone(),
        })
        .map_err(|e| BootstrapError::Smtp(e.to_string()))?;
        Arc::new(smtp)
    } else {
        tracing::warn!("SMTP disabled, outbound mail will be dropped");
        Arc::new(NoopMailer)
    };

    let runner = Arc::new(QuizJobRunner::new(state.store.clone(), mailer));
    let workers = WorkerPool::new(
        state.queue.clone(),
        runner,
        WorkerConfig {
            workers: cfg.jobs.workers,
            poll_interval: Duration::from_secs(cfg.jobs.poll_interval_secs),
            batch_size: cfg.jobs.batch_size,
            max_attempts: cfg.jobs.max_attempts,
            retry_delay: Duration::from_secs(cfg.jobs.retry_delay_secs),
        },
    )
    .start();

    Ok(BackgroundTasks {
        dispatcher: Some(dispatcher),
        workers: Some(workers),
    })
}

pub struct QuizmasterServer {
    addr: SocketAddr,
    app: Router,
}

impl QuizmasterServer {
    pub async fn run(self) -> Result<(), BootstrapError> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(BootstrapError::Bind)?;
        tracing::info!(addr = %self.addr, "Quizmaster server listening");
        axum::serve(listener, self.app)
            .await
            .map_err(BootstrapError::Bind)
    }
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.config = cfg;
        self
    }

    /// Build the server and start its background loops.
    pub fn build(self) -> Result<(QuizmasterServer, BackgroundTasks), BootstrapError> {
        let state = build_state(&self.config)?;
        let background = start_background(&state, &self.config)?;
        let addr = self.config.addr();
        let app = build_router(state);
        Ok((QuizmasterServer { addr, app }, background))
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
