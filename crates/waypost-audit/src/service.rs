//! The audit service boundary.
//!
//! [`ProcessService`] is the write contract consumed by the logging
//! activities. [`AuditService`] implements it on top of a [`ProcessStore`]
//! and adds the read side used by operators.

use async_trait::async_trait;
use std::sync::Arc;

use waypost_core::AuditConfig;

use crate::error::AuditError;
use crate::process::{Process, ProcessEvent, ProcessStatus, StoredEvent};
use crate::storage::{create_store, NullStore, ProcessStore};

/// Write contract of the audit service.
///
/// Both operations must be idempotent: the workflow engine may deliver the
/// same activity call more than once.
#[async_trait]
pub trait ProcessService: Send + Sync {
    /// Insert or update a process, returning its id.
    async fn log_process(&self, process: Process) -> Result<String, AuditError>;

    /// Record a process event, returning the event id.
    async fn log_process_event(&self, event: ProcessEvent) -> Result<u64, AuditError>;
}

/// Filter for querying processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessFilter {
    pub org_id: Option<u32>,
    pub parent_id: Option<String>,
    pub resource_id: Option<String>,
    pub process_type: Option<String>,
    pub status: Option<ProcessStatus>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
}

impl ProcessFilter {
    pub fn matches(&self, process: &Process) -> bool {
        if let Some(org_id) = self.org_id {
            if process.org_id != org_id {
                return false;
            }
        }
        if let Some(ref parent_id) = self.parent_id {
            if &process.parent_id != parent_id {
                return false;
            }
        }
        if let Some(ref resource_id) = self.resource_id {
            if &process.resource_id != resource_id {
                return false;
            }
        }
        if let Some(ref process_type) = self.process_type {
            if &process.process_type != process_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if process.status != status {
                return false;
            }
        }
        true
    }
}

/// A process together with its events.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProcessDetails {
    #[serde(flatten)]
    pub process: Process,
    pub events: Vec<StoredEvent>,
}

/// The audit service.
pub struct AuditService {
    config: AuditConfig,
    store: Arc<dyn ProcessStore>,
}

impl AuditService {
    /// Create a service with the store selected by `config`.
    pub fn new(config: AuditConfig) -> Result<Self, AuditError> {
        let store: Arc<dyn ProcessStore> = if config.enabled {
            create_store(&config)?
        } else {
            Arc::new(NullStore)
        };
        Ok(Self { config, store })
    }

    /// Create a service with a custom store.
    pub fn with_store(config: AuditConfig, store: Arc<dyn ProcessStore>) -> Self {
        Self { config, store }
    }

    /// Create a disabled (no-op) service.
    pub fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                ..Default::default()
            },
            store: Arc::new(NullStore),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn get_process(&self, id: &str) -> Result<Option<Process>, AuditError> {
        self.store.get_process(id).await
    }

    /// Get a process with its events.
    pub async fn process_details(&self, id: &str) -> Result<Option<ProcessDetails>, AuditError> {
        let Some(process) = self.store.get_process(id).await? else {
            return Ok(None);
        };
        let events = self.store.events_for(id).await?;
        Ok(Some(ProcessDetails { process, events }))
    }

    pub async fn list_processes(&self, filter: &ProcessFilter) -> Result<Vec<Process>, AuditError> {
        self.store.query_processes(filter).await
    }

    pub async fn list_events(&self, process_id: &str) -> Result<Vec<StoredEvent>, AuditError> {
        self.store.events_for(process_id).await
    }

    /// Direct children of a process.
    pub async fn children(&self, parent_id: &str) -> Result<Vec<Process>, AuditError> {
        self.list_processes(&ProcessFilter {
            parent_id: Some(parent_id.to_string()),
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
impl ProcessService for AuditService {
    async fn log_process(&self, process: Process) -> Result<String, AuditError> {
        process.validate()?;
        if !self.config.enabled {
            return Ok(process.id);
        }

        tracing::debug!(
            process_id = %process.id,
            parent_id = %process.parent_id,
            org_id = process.org_id,
            process_type = %process.process_type,
            status = %process.status,
            "Process record"
        );

        Ok(self.store.upsert_process(process).await?.into_inner())
    }

    async fn log_process_event(&self, event: ProcessEvent) -> Result<u64, AuditError> {
        event.validate()?;
        if !self.config.enabled {
            return Ok(0);
        }

        tracing::debug!(
            process_id = %event.process_id,
            event_type = %event.event_type,
            status = %event.status,
            "Process event record"
        );

        Ok(self.store.append_event(event).await?.into_inner())
    }
}
