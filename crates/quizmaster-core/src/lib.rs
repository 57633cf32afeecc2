//! Core types and collaborator boundaries for the Quizmaster server.
//!
//! This crate defines the seams the cache and job layers are built against:
//! the request [`Actor`], the row-oriented [`DataStore`] query interface, and
//! the [`Mailer`] delivery interface. The concrete relational store and SMTP
//! transport live behind these traits; an in-memory store and a recording
//! mailer are provided for single-instance deployments and tests.

pub mod actor;
pub mod error;
pub mod mailer;
pub mod memory;
pub mod rows;
pub mod store;
pub mod time_util;

pub use actor::Actor;
pub use error::{MailError, StoreError};
pub use mailer::{EmailAttachment, Mailer, MemoryMailer, NoopMailer, OutboundEmail};
pub use memory::MemoryDataStore;
pub use rows::{Row, get_i64, get_str, object};
pub use store::{DataStore, NewScore, NewSubject, ReminderSlot};
pub use time_util::{format_date, month_label, previous_month};

/// Type alias for a shareable data store instance.
pub type DynDataStore = std::sync::Arc<dyn DataStore>;

/// Type alias for a shareable mailer instance.
pub type DynMailer = std::sync::Arc<dyn Mailer>;
