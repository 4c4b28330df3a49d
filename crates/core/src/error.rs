//! Error types for the JobRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// Errors that stop the relay from starting or running.
///
/// Per-message failures never surface here: the relay logs and counts them.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Outbound dispatch errors ---
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    // --- Listener / server I/O ---
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the context session store.
///
/// The resolver never propagates these: a failed lookup or mutation
/// degrades that resolution path to "not found".
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupt session row: {0}")]
    Corrupt(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Failures delivering an envelope to the automation endpoint.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("Endpoint returned non-success status {status_code}: {body}")]
    Status { status_code: u16, body: String },

    #[error("Dispatch timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Envelope serialization failed: {0}")]
    Serialization(String),

    #[error("Dispatcher not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Webhook signature mismatch")]
    SignatureMismatch,

    #[error("Subscription verification failed")]
    VerificationFailed,
}
