//! Process and process event records.
//!
//! A [`Process`] is the audit record for one full workflow execution. A
//! [`ProcessEvent`] is the audit record for one named sub-step inside it.
//! Both share the three-valued [`ProcessStatus`] lifecycle:
//! `running -> finished` or `running -> failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuditError;

/// Lifecycle status shared by processes and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Work has started and not yet completed.
    Running,
    /// Work completed with an error.
    Failed,
    /// Work completed successfully.
    Finished,
}

impl ProcessStatus {
    /// Failed and Finished are terminal.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether a stored record in this status may be overwritten by `next`.
    ///
    /// Repeating the current status is allowed so that redelivered writes
    /// are accepted.
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        match (self, next) {
            (Self::Running, _) => true,
            (current, next) => current == next,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessStatus {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "finished" => Ok(Self::Finished),
            other => Err(AuditError::QueryFailed(format!(
                "unknown process status '{other}'"
            ))),
        }
    }
}

/// Audit record for one trackable workflow execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    /// Execution id assigned by the workflow engine.
    pub id: String,

    /// Parent execution id, empty for root executions.
    #[serde(default)]
    pub parent_id: String,

    /// Organization the work belongs to.
    pub org_id: u32,

    /// Workflow type the process was started as.
    #[serde(rename = "type")]
    pub process_type: String,

    /// Free-text message, the error description for failed processes.
    #[serde(default)]
    pub log: String,

    /// Subject being acted on (e.g. a cluster id).
    pub resource_id: String,

    pub status: ProcessStatus,

    pub started_at: DateTime<Utc>,

    /// Set once the process is terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Process {
    /// Check the lifecycle invariants of a single record.
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.id.is_empty() {
            return Err(AuditError::InvalidRecord("process id is empty".to_string()));
        }

        match (self.status, self.finished_at) {
            (ProcessStatus::Running, Some(_)) => {
                return Err(AuditError::InvalidRecord(format!(
                    "process {} is running but has finished_at set",
                    self.id
                )));
            }
            (status, None) if status.is_terminal() => {
                return Err(AuditError::InvalidRecord(format!(
                    "process {} is {} but has no finished_at",
                    self.id, status
                )));
            }
            (_, Some(finished_at)) if finished_at < self.started_at => {
                return Err(AuditError::InvalidRecord(format!(
                    "process {} finished before it started",
                    self.id
                )));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty()
    }
}

/// Audit record for one named sub-step of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// Id of the enclosing process.
    pub process_id: String,

    /// Position of the step within its process, assigned by the recorder
    /// that opened it. The open and close writes of a step share it.
    #[serde(default)]
    pub sequence: u64,

    /// Step name.
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub log: String,

    pub status: ProcessStatus,

    pub timestamp: DateTime<Utc>,
}

impl ProcessEvent {
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.process_id.is_empty() {
            return Err(AuditError::InvalidRecord(
                "event process id is empty".to_string(),
            ));
        }
        if self.event_type.is_empty() {
            return Err(AuditError::InvalidRecord(format!(
                "event of process {} has no type",
                self.process_id
            )));
        }
        Ok(())
    }
}

/// An event as kept by a store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: u64,
    #[serde(flatten)]
    pub event: ProcessEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn running() -> Process {
        Process {
            id: "wf-1".to_string(),
            parent_id: String::new(),
            org_id: 7,
            process_type: "create-cluster".to_string(),
            log: String::new(),
            resource_id: "cluster-42".to_string(),
            status: ProcessStatus::Running,
            started_at: t0(),
            finished_at: None,
        }
    }

    #[test]
    fn test_status_transitions() {
        use ProcessStatus::*;

        assert!(Running.can_transition_to(Running));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Finished));
        assert!(Finished.can_transition_to(Finished));
        assert!(Failed.can_transition_to(Failed));

        assert!(!Finished.can_transition_to(Running));
        assert!(!Finished.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Finished));
        assert!(!Failed.can_transition_to(Running));
    }

    #[test]
    fn test_status_text() {
        assert_eq!(ProcessStatus::Running.to_string(), "running");
        assert_eq!(
            serde_json::to_string(&ProcessStatus::Finished).unwrap(),
            "\"finished\""
        );
        assert_eq!(
            "FAILED".parse::<ProcessStatus>().unwrap(),
            ProcessStatus::Failed
        );
        assert!("done".parse::<ProcessStatus>().is_err());
    }

    #[test]
    fn test_running_process_is_valid() {
        let process = running();
        assert!(process.validate().is_ok());
        assert!(process.is_root());
    }

    #[test]
    fn test_running_with_finished_at_is_invalid() {
        let mut process = running();
        process.finished_at = Some(t0());
        assert!(matches!(
            process.validate(),
            Err(AuditError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_terminal_requires_finished_at() {
        let mut process = running();
        process.status = ProcessStatus::Finished;
        assert!(process.validate().is_err());

        process.finished_at = Some(t0() + Duration::seconds(5));
        assert!(process.validate().is_ok());
    }

    #[test]
    fn test_finished_before_start_is_invalid() {
        let mut process = running();
        process.status = ProcessStatus::Failed;
        process.finished_at = Some(t0() - Duration::seconds(1));
        assert!(process.validate().is_err());
    }

    #[test]
    fn test_event_requires_process_and_type() {
        let event = ProcessEvent {
            process_id: String::new(),
            sequence: 1,
            event_type: "create-worker-pool".to_string(),
            log: String::new(),
            status: ProcessStatus::Running,
            timestamp: t0(),
        };
        assert!(event.validate().is_err());

        let event = ProcessEvent {
            process_id: "wf-1".to_string(),
            event_type: String::new(),
            ..event
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(running()).unwrap();
        assert_eq!(json["type"], "create-cluster");
        assert_eq!(json["status"], "running");
        assert!(json.get("finished_at").is_none());
    }
}
