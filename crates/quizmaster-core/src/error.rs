use thiserror::Error;

/// Errors surfaced by the data-store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}

/// Errors surfaced by the mail-delivery boundary.
#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("send failed: {0}")]
    SendFailed(String),
}
