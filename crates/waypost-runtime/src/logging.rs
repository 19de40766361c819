//! Logging activities.
//!
//! These are the only code paths that call the audit service. Each one
//! translates its flat input into a record and makes exactly one service
//! call; the service error is returned unchanged so that the engine's retry
//! policy sees it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use waypost_audit::{AuditError, Process, ProcessEvent, ProcessService, ProcessStatus};

use crate::activity::{ActivityRef, ActivityRegistry};
use crate::error::RegistryError;

/// Activity that upserts a process record.
pub const PROCESS_LOG: ActivityRef<ProcessLogInput> = ActivityRef::new("process-log");

/// Activity that appends a process event record.
pub const PROCESS_EVENT: ActivityRef<ProcessEventInput> = ActivityRef::new("process-event");

/// Input of [`PROCESS_LOG`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessLogInput {
    pub id: String,
    pub parent_id: String,
    pub org_id: u32,
    pub process_type: String,
    pub log: String,
    pub resource_id: String,
    pub status: ProcessStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<ProcessLogInput> for Process {
    fn from(input: ProcessLogInput) -> Self {
        Process {
            id: input.id,
            parent_id: input.parent_id,
            org_id: input.org_id,
            process_type: input.process_type,
            log: input.log,
            resource_id: input.resource_id,
            status: input.status,
            started_at: input.started_at,
            finished_at: input.finished_at,
        }
    }
}

/// Input of [`PROCESS_EVENT`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEventInput {
    pub process_id: String,
    pub sequence: u64,
    pub event_type: String,
    pub log: String,
    pub status: ProcessStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<ProcessEventInput> for ProcessEvent {
    fn from(input: ProcessEventInput) -> Self {
        ProcessEvent {
            process_id: input.process_id,
            sequence: input.sequence,
            event_type: input.event_type,
            log: input.log,
            status: input.status,
            timestamp: input.timestamp,
        }
    }
}

/// The process logging activities, bound to an audit service.
#[derive(Clone)]
pub struct ProcessLogActivity {
    service: Arc<dyn ProcessService>,
}

impl ProcessLogActivity {
    pub fn new(service: Arc<dyn ProcessService>) -> Self {
        Self { service }
    }

    pub async fn execute_process_log(&self, input: ProcessLogInput) -> Result<(), AuditError> {
        self.service.log_process(input.into()).await.map(|_| ())
    }

    pub async fn execute_process_event(&self, input: ProcessEventInput) -> Result<(), AuditError> {
        self.service.log_process_event(input.into()).await.map(|_| ())
    }

    /// Register both activities under their wire names.
    pub fn register(&self, registry: &mut ActivityRegistry) -> Result<(), RegistryError> {
        let activity = self.clone();
        registry.register(PROCESS_LOG, move |input: ProcessLogInput| {
            let activity = activity.clone();
            async move { activity.execute_process_log(input).await }
        })?;

        let activity = self.clone();
        registry.register(PROCESS_EVENT, move |input: ProcessEventInput| {
            let activity = activity.clone();
            async move { activity.execute_process_event(input).await }
        })?;

        Ok(())
    }
}

/// Names every worker must register before running recorders.
pub fn required_activities() -> [&'static str; 2] {
    [PROCESS_LOG.name(), PROCESS_EVENT.name()]
}

/// Build a validated registry holding the logging activities.
pub fn process_log_registry(
    service: Arc<dyn ProcessService>,
) -> Result<ActivityRegistry, RegistryError> {
    let mut registry = ActivityRegistry::new();
    ProcessLogActivity::new(service).register(&mut registry)?;
    registry.validate(&required_activities())?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingService {
        processes: Mutex<Vec<Process>>,
        events: Mutex<Vec<ProcessEvent>>,
    }

    #[async_trait]
    impl ProcessService for RecordingService {
        async fn log_process(&self, process: Process) -> Result<String, AuditError> {
            let id = process.id.clone();
            self.processes.lock().unwrap().push(process);
            Ok(id)
        }

        async fn log_process_event(&self, event: ProcessEvent) -> Result<u64, AuditError> {
            let mut events = self.events.lock().unwrap();
            events.push(event);
            Ok(events.len() as u64)
        }
    }

    struct FailingService;

    #[async_trait]
    impl ProcessService for FailingService {
        async fn log_process(&self, _process: Process) -> Result<String, AuditError> {
            Err(AuditError::Storage("database is locked".to_string()))
        }

        async fn log_process_event(&self, _event: ProcessEvent) -> Result<u64, AuditError> {
            Err(AuditError::Storage("database is locked".to_string()))
        }
    }

    fn log_input() -> ProcessLogInput {
        ProcessLogInput {
            id: "wf-1".to_string(),
            parent_id: "wf-0".to_string(),
            org_id: 7,
            process_type: "create-cluster".to_string(),
            log: String::new(),
            resource_id: "cluster-42".to_string(),
            status: ProcessStatus::Running,
            started_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            finished_at: None,
        }
    }

    #[test]
    fn test_activity_names() {
        assert_eq!(PROCESS_LOG.name(), "process-log");
        assert_eq!(PROCESS_EVENT.name(), "process-event");
    }

    #[tokio::test]
    async fn test_process_log_maps_fields() {
        let service = Arc::new(RecordingService::default());
        let activity = ProcessLogActivity::new(service.clone());

        activity.execute_process_log(log_input()).await.unwrap();

        let processes = service.processes.lock().unwrap();
        assert_eq!(processes.len(), 1);
        let p = &processes[0];
        assert_eq!(p.id, "wf-1");
        assert_eq!(p.parent_id, "wf-0");
        assert_eq!(p.org_id, 7);
        assert_eq!(p.process_type, "create-cluster");
        assert_eq!(p.resource_id, "cluster-42");
        assert_eq!(p.status, ProcessStatus::Running);
        assert_eq!(p.finished_at, None);
    }

    #[tokio::test]
    async fn test_process_event_maps_fields() {
        let service = Arc::new(RecordingService::default());
        let activity = ProcessLogActivity::new(service.clone());
        let timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 0).unwrap();

        activity
            .execute_process_event(ProcessEventInput {
                process_id: "wf-1".to_string(),
                sequence: 3,
                event_type: "create-worker-pool".to_string(),
                log: "stack already exists".to_string(),
                status: ProcessStatus::Failed,
                timestamp,
            })
            .await
            .unwrap();

        let events = service.events.lock().unwrap();
        assert_eq!(events[0].event_type, "create-worker-pool");
        assert_eq!(events[0].sequence, 3);
        assert_eq!(events[0].log, "stack already exists");
        assert_eq!(events[0].status, ProcessStatus::Failed);
        assert_eq!(events[0].timestamp, timestamp);
    }

    #[tokio::test]
    async fn test_service_error_returned_verbatim() {
        let activity = ProcessLogActivity::new(Arc::new(FailingService));
        let err = activity.execute_process_log(log_input()).await.unwrap_err();
        assert!(matches!(err, AuditError::Storage(ref m) if m == "database is locked"));
    }

    #[tokio::test]
    async fn test_registry_routes_by_name() {
        let service = Arc::new(RecordingService::default());
        let registry = process_log_registry(service.clone()).unwrap();
        assert_eq!(registry.names(), vec!["process-event", "process-log"]);

        let payload = serde_json::to_value(log_input()).unwrap();
        registry.invoke("process-log", payload).await.unwrap();

        assert_eq!(service.processes.lock().unwrap().len(), 1);
        assert!(service.events.lock().unwrap().is_empty());
    }
}
