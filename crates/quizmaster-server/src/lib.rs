//! Quizmaster HTTP server.
//!
//! Wires the response cache and invalidation middleware around the quiz
//! platform's route handlers and runs the scheduled job system alongside the
//! request path. The relational store and SMTP relay are collaborators
//! injected at bootstrap; see `quizmaster-core` for the boundaries.

pub mod cache;
pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{BackgroundTasks, BootstrapError, QuizmasterServer, ServerBuilder};
pub use state::AppState;
