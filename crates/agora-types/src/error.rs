use thiserror::Error;

/// Message shape violations. Write-side failures block the write; read-side
/// failures cause the record to be skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message id must not be empty")]
    EmptyId,
    #[error("message text must not be empty")]
    EmptyText,
    #[error("sender must be a positive user id, got {0}")]
    InvalidSender(i64),
    #[error("timestamp must be non-negative, got {0}")]
    NegativeTimestamp(i64),
}

/// Errors crossing the message-store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Transport or backend failure for a single operation.
    #[error("storage backend error")]
    Backend(#[from] anyhow::Error),
    /// The live subscription fell behind and dropped events.
    #[error("subscription lagged, {missed} events dropped")]
    Lagged { missed: u64 },
}

/// Errors surfaced by the feed controller to its caller. Store-boundary
/// failures during fetches are reported as notifications on the event
/// stream instead; these are the caller-facing cases.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The feed task is no longer running.
    #[error("feed is closed")]
    Closed,
}
