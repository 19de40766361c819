//! Error types for activity registration and dispatch.

use std::time::Duration;
use thiserror::Error;
use waypost_audit::AuditError;

/// Errors surfaced by an activity invocation.
///
/// Only the dispatching code sees these. Recorders downgrade them to
/// non-fatal warnings.
#[derive(Debug, Error)]
pub enum ActivityError {
    /// No handler is registered under the name.
    #[error("activity '{0}' is not registered")]
    NotRegistered(String),

    /// The payload could not be decoded into the handler's input type.
    #[error("invalid input for activity '{activity}': {reason}")]
    InvalidInput { activity: String, reason: String },

    /// The audit service rejected the write.
    #[error(transparent)]
    Service(#[from] AuditError),

    /// The invocation did not complete in time.
    #[error("activity '{activity}' timed out after {after:?}")]
    Timeout { activity: String, after: Duration },

    /// The enclosing workflow execution was cancelled.
    #[error("activity '{0}' not started: workflow execution cancelled")]
    Cancelled(String),
}

/// Errors raised while building an activity registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("activity '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("required activities are not registered: {}", .0.join(", "))]
    Missing(Vec<String>),
}
