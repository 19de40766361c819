//! Non-fatal observations.
//!
//! Recorders never fail the workflow because of an audit write. Instead
//! every failed write is reported here as a [`NonFatal`] warning.

use std::fmt;
use std::sync::Mutex;

/// Which recorder step produced a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Open,
    Close,
}

impl fmt::Display for RecorderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("open"),
            Self::Close => f.write_str("close"),
        }
    }
}

/// An audit write that failed without affecting the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonFatal {
    /// Execution that issued the write.
    pub execution_id: String,
    /// Activity that failed.
    pub activity: &'static str,
    pub phase: RecorderPhase,
    /// Error description.
    pub message: String,
}

impl fmt::Display for NonFatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to log {} on {} for execution {}: {}",
            self.activity, self.phase, self.execution_id, self.message
        )
    }
}

/// Receives non-fatal warnings.
pub trait WarningSink: Send + Sync {
    fn record(&self, warning: NonFatal);
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWarnings;

impl WarningSink for TracingWarnings {
    fn record(&self, warning: NonFatal) {
        tracing::warn!(
            execution_id = %warning.execution_id,
            activity = warning.activity,
            phase = %warning.phase,
            "{}",
            warning
        );
    }
}

/// Sink that logs and keeps every warning for later inspection.
#[derive(Debug, Default)]
pub struct CollectingWarnings {
    warnings: Mutex<Vec<NonFatal>>,
}

impl CollectingWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the warnings recorded so far.
    pub fn warnings(&self) -> Vec<NonFatal> {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl WarningSink for CollectingWarnings {
    fn record(&self, warning: NonFatal) {
        TracingWarnings.record(warning.clone());
        self.warnings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(warning);
    }
}
