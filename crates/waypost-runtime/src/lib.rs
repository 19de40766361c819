//! # waypost-runtime
//!
//! Audit recording for workflow executions.
//!
//! Workflow code opens a [`ProcessRecorder`] for the execution and an
//! [`EventRecorder`] per tracked step. Recorders write through the two
//! logging activities, `process-log` and `process-event`, which are
//! dispatched by the workflow engine and are the only code that talks to
//! the audit service.
//!
//! Everything a recorder needs from the engine arrives through an explicit
//! [`WorkflowContext`]: execution identity, a deterministic [`Clock`], the
//! [`ActivityDispatcher`], a [`WarningSink`] for non-fatal write failures
//! and a [`CancellationSignal`].
//!
//! Wiring a worker:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waypost_audit::AuditService;
//! use waypost_core::WaypostConfig;
//! use waypost_runtime::{
//!     process_log_registry, ExecutionInfo, LocalDispatcher, ProcessRecorder, WorkflowContext,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WaypostConfig::default();
//! let service = Arc::new(AuditService::new(config.audit.clone())?);
//! let registry = Arc::new(process_log_registry(service)?);
//! let dispatcher = Arc::new(LocalDispatcher::from_config(registry, &config.activities));
//!
//! let ctx = WorkflowContext::builder(ExecutionInfo::root("wf-1", "create-cluster"), dispatcher)
//!     .build();
//! let process = ProcessRecorder::open(&ctx, 7, "cluster-42").await;
//! process.finish(&ctx).await;
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod context;
pub mod error;
pub mod logging;
pub mod observe;
pub mod recorder;

pub use activity::{ActivityDispatcher, ActivityRef, ActivityRegistry, LocalDispatcher};
pub use context::{
    CancellationSignal, Clock, ExecutionInfo, ManualClock, SystemClock, WorkflowContext,
    WorkflowContextBuilder,
};
pub use error::{ActivityError, RegistryError};
pub use logging::{
    PROCESS_EVENT, PROCESS_LOG, ProcessEventInput, ProcessLogActivity, ProcessLogInput,
    process_log_registry, required_activities,
};
pub use observe::{CollectingWarnings, NonFatal, RecorderPhase, TracingWarnings, WarningSink};
pub use recorder::{EventRecorder, ProcessRecorder};
