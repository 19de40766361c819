//! Workflow execution context.
//!
//! The context is the only way workflow code reaches engine facilities:
//! execution identity, the deterministic clock, activity dispatch, the
//! warning sink and the cancellation signal. It is passed explicitly to
//! every recorder call.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::activity::{ActivityDispatcher, ActivityRef};
use crate::error::ActivityError;
use crate::observe::{NonFatal, TracingWarnings, WarningSink};

/// Identity of a workflow execution as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionInfo {
    pub execution_id: String,
    pub parent_execution_id: Option<String>,
    pub workflow_type: String,
}

impl ExecutionInfo {
    /// Identity of an execution without a parent.
    pub fn root(execution_id: impl Into<String>, workflow_type: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            parent_execution_id: None,
            workflow_type: workflow_type.into(),
        }
    }

    pub fn with_parent(mut self, parent_execution_id: impl Into<String>) -> Self {
        self.parent_execution_id = Some(parent_execution_id.into());
        self
    }
}

/// Time source of a workflow execution.
///
/// Implementations provided by a replaying engine must return the same
/// instants on every replay of the same history.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, for engines that do not replay.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Shared cancellation flag of a workflow execution.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Context provided to workflow code during execution.
#[derive(Clone)]
pub struct WorkflowContext {
    info: ExecutionInfo,
    clock: Arc<dyn Clock>,
    dispatcher: Arc<dyn ActivityDispatcher>,
    warnings: Arc<dyn WarningSink>,
    cancellation: CancellationSignal,
    /// Events opened so far by this execution.
    events: Arc<AtomicU64>,
}

impl WorkflowContext {
    pub fn builder(
        info: ExecutionInfo,
        dispatcher: Arc<dyn ActivityDispatcher>,
    ) -> WorkflowContextBuilder {
        WorkflowContextBuilder::new(info, dispatcher)
    }

    pub fn info(&self) -> &ExecutionInfo {
        &self.info
    }

    pub fn execution_id(&self) -> &str {
        &self.info.execution_id
    }

    /// Current time from the execution's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Sequence number for the next event of this execution, starting at 1.
    ///
    /// Workflow code opens its steps in the same order on every replay, so
    /// a step gets the same number each time.
    pub fn next_event_sequence(&self) -> u64 {
        self.events.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Context for a child execution started by this one.
    ///
    /// The child shares clock, dispatcher, warning sink and cancellation
    /// signal, and reports this execution as its parent.
    pub fn child(
        &self,
        execution_id: impl Into<String>,
        workflow_type: impl Into<String>,
    ) -> WorkflowContext {
        WorkflowContext {
            info: ExecutionInfo::root(execution_id, workflow_type)
                .with_parent(self.info.execution_id.clone()),
            clock: self.clock.clone(),
            dispatcher: self.dispatcher.clone(),
            warnings: self.warnings.clone(),
            cancellation: self.cancellation.clone(),
            events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Execute an activity and wait for its result.
    pub async fn execute_activity<I: Serialize>(
        &self,
        activity: ActivityRef<I>,
        input: &I,
    ) -> Result<(), ActivityError> {
        if self.is_cancelled() {
            return Err(ActivityError::Cancelled(activity.name().to_string()));
        }

        let payload = serde_json::to_value(input).map_err(|e| ActivityError::InvalidInput {
            activity: activity.name().to_string(),
            reason: e.to_string(),
        })?;

        self.dispatcher.dispatch(activity.name(), payload).await
    }

    /// Hand a non-fatal warning to the execution's sink.
    pub fn report_non_fatal(&self, warning: NonFatal) {
        self.warnings.record(warning);
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("info", &self.info)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkflowContext`].
pub struct WorkflowContextBuilder {
    info: ExecutionInfo,
    dispatcher: Arc<dyn ActivityDispatcher>,
    clock: Arc<dyn Clock>,
    warnings: Arc<dyn WarningSink>,
    cancellation: CancellationSignal,
}

impl WorkflowContextBuilder {
    pub fn new(info: ExecutionInfo, dispatcher: Arc<dyn ActivityDispatcher>) -> Self {
        Self {
            info,
            dispatcher,
            clock: Arc::new(SystemClock),
            warnings: Arc::new(TracingWarnings),
            cancellation: CancellationSignal::new(),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn warnings(mut self, warnings: Arc<dyn WarningSink>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn build(self) -> WorkflowContext {
        WorkflowContext {
            info: self.info,
            clock: self.clock,
            dispatcher: self.dispatcher,
            warnings: self.warnings,
            cancellation: self.cancellation,
            events: Arc::new(AtomicU64::new(0)),
        }
    }
}
