//! Process and event recorders.
//!
//! A recorder is opened when workflow code starts a trackable unit of work
//! and closed with the outcome of that work. Opening writes a `running`
//! record; closing writes the terminal `finished` or `failed` record under
//! the same key. Closing consumes the recorder, so a record can only be
//! finalized once.
//!
//! Recorders never return errors. A failed write is reported to the
//! context's warning sink and the workflow carries on.
//!
//! ```rust,no_run
//! use waypost_runtime::{EventRecorder, ProcessRecorder, WorkflowContext};
//!
//! # async fn create_worker_pool() -> Result<(), std::io::Error> { Ok(()) }
//! # async fn workflow(ctx: WorkflowContext) -> Result<(), std::io::Error> {
//! let process = ProcessRecorder::open(&ctx, 7, "cluster-42").await;
//!
//! let step = EventRecorder::open(&ctx, "create-worker-pool").await;
//! let result = create_worker_pool().await;
//! step.close(&ctx, &result).await;
//!
//! process.close(&ctx, &result).await;
//! result
//! # }
//! ```

use std::convert::Infallible;
use std::fmt::Display;

use waypost_audit::ProcessStatus;

use crate::context::WorkflowContext;
use crate::error::ActivityError;
use crate::logging::{PROCESS_EVENT, PROCESS_LOG, ProcessEventInput, ProcessLogInput};
use crate::observe::{NonFatal, RecorderPhase};

fn non_fatal(
    ctx: &WorkflowContext,
    activity: &'static str,
    phase: RecorderPhase,
    error: &ActivityError,
) -> NonFatal {
    NonFatal {
        execution_id: ctx.execution_id().to_string(),
        activity,
        phase,
        message: error.to_string(),
    }
}

/// Terminal status and message for an outcome.
fn terminal<T, E: Display>(outcome: &Result<T, E>) -> (ProcessStatus, Option<String>) {
    match outcome {
        Ok(_) => (ProcessStatus::Finished, None),
        Err(e) => (ProcessStatus::Failed, Some(e.to_string())),
    }
}

/// Recorder for the process of a whole workflow execution.
#[derive(Debug)]
#[must_use = "a process recorder must be closed to finalize its record"]
pub struct ProcessRecorder {
    input: ProcessLogInput,
}

impl ProcessRecorder {
    /// Write the initial `running` record of the current execution.
    ///
    /// Identity and parent linkage come from the context, the start time
    /// from its clock.
    pub async fn open(
        ctx: &WorkflowContext,
        org_id: u32,
        resource_id: impl Into<String>,
    ) -> ProcessRecorder {
        let info = ctx.info();
        let input = ProcessLogInput {
            id: info.execution_id.clone(),
            parent_id: info.parent_execution_id.clone().unwrap_or_default(),
            org_id,
            process_type: info.workflow_type.clone(),
            log: String::new(),
            resource_id: resource_id.into(),
            status: ProcessStatus::Running,
            started_at: ctx.now(),
            finished_at: None,
        };

        if let Err(e) = ctx.execute_activity(PROCESS_LOG, &input).await {
            ctx.report_non_fatal(non_fatal(ctx, PROCESS_LOG.name(), RecorderPhase::Open, &e));
        }

        ProcessRecorder { input }
    }

    /// The record as written on open.
    pub fn input(&self) -> &ProcessLogInput {
        &self.input
    }

    pub fn process_id(&self) -> &str {
        &self.input.id
    }

    /// Write the terminal record for `outcome` and return it.
    ///
    /// `Ok` yields `finished` with the message untouched, `Err` yields
    /// `failed` with the error's description as the message.
    pub async fn close<T, E: Display>(
        self,
        ctx: &WorkflowContext,
        outcome: &Result<T, E>,
    ) -> ProcessLogInput {
        let mut input = self.input;
        input.finished_at = Some(ctx.now());

        let (status, log) = terminal(outcome);
        input.status = status;
        if let Some(log) = log {
            input.log = log;
        }

        if let Err(e) = ctx.execute_activity(PROCESS_LOG, &input).await {
            ctx.report_non_fatal(non_fatal(ctx, PROCESS_LOG.name(), RecorderPhase::Close, &e));
        }

        input
    }

    /// Close as finished.
    pub async fn finish(self, ctx: &WorkflowContext) -> ProcessLogInput {
        self.close(ctx, &Ok::<(), Infallible>(())).await
    }
}

/// Recorder for one named step inside the current process.
#[derive(Debug)]
#[must_use = "an event recorder must be closed to finalize its record"]
pub struct EventRecorder {
    input: ProcessEventInput,
}

impl EventRecorder {
    /// Write the `running` event for `step_name`.
    pub async fn open(ctx: &WorkflowContext, step_name: impl Into<String>) -> EventRecorder {
        let input = ProcessEventInput {
            process_id: ctx.execution_id().to_string(),
            sequence: ctx.next_event_sequence(),
            event_type: step_name.into(),
            log: String::new(),
            status: ProcessStatus::Running,
            timestamp: ctx.now(),
        };

        if let Err(e) = ctx.execute_activity(PROCESS_EVENT, &input).await {
            ctx.report_non_fatal(non_fatal(ctx, PROCESS_EVENT.name(), RecorderPhase::Open, &e));
        }

        EventRecorder { input }
    }

    pub fn input(&self) -> &ProcessEventInput {
        &self.input
    }

    pub fn step_name(&self) -> &str {
        &self.input.event_type
    }

    /// Re-stamp the event and write its terminal status.
    pub async fn close<T, E: Display>(
        self,
        ctx: &WorkflowContext,
        outcome: &Result<T, E>,
    ) -> ProcessEventInput {
        let mut input = self.input;
        input.timestamp = ctx.now();

        let (status, log) = terminal(outcome);
        input.status = status;
        if let Some(log) = log {
            input.log = log;
        }

        if let Err(e) = ctx.execute_activity(PROCESS_EVENT, &input).await {
            ctx.report_non_fatal(non_fatal(ctx, PROCESS_EVENT.name(), RecorderPhase::Close, &e));
        }

        input
    }

    pub async fn finish(self, ctx: &WorkflowContext) -> ProcessEventInput {
        self.close(ctx, &Ok::<(), Infallible>(())).await
    }
}
