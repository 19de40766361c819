//! Audit storage backends.
//!
//! All backends share the same upsert discipline:
//! - a process write is ignored once the stored process is terminal;
//! - otherwise the last write for a process id wins;
//! - an event write is keyed by its process, step sequence and status; a
//!   repeated write for the same key is not appended again, the existing id
//!   is returned instead.
//!
//! The file backend journals a write before the index sees it, so a write
//! whose journal append failed is retried in full on redelivery.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use waypost_core::config::audit::{AuditConfig, StorageBackend};

use crate::error::AuditError;
use crate::process::{Process, ProcessEvent, StoredEvent};
use crate::service::ProcessFilter;

/// Outcome of a write against a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The write changed stored state.
    Stored(T),
    /// The write was absorbed without changing anything.
    Unchanged(T),
}

impl<T> WriteOutcome<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Stored(value) | Self::Unchanged(value) => value,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored(_))
    }
}

/// Trait for audit storage backends.
#[async_trait]
pub trait ProcessStore: Send + Sync {
    /// Insert or update a process keyed by its id.
    async fn upsert_process(&self, process: Process) -> Result<WriteOutcome<String>, AuditError>;

    /// Append an event to its process's event list.
    async fn append_event(&self, event: ProcessEvent) -> Result<WriteOutcome<u64>, AuditError>;

    /// Get a process by id.
    async fn get_process(&self, id: &str) -> Result<Option<Process>, AuditError>;

    /// Query processes, newest first.
    async fn query_processes(&self, filter: &ProcessFilter) -> Result<Vec<Process>, AuditError>;

    /// Events of a process in emission order.
    async fn events_for(&self, process_id: &str) -> Result<Vec<StoredEvent>, AuditError>;
}

/// Create a storage backend based on configuration.
pub fn create_store(config: &AuditConfig) -> Result<Arc<dyn ProcessStore>, AuditError> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageBackend::File => Ok(Arc::new(FileStore::open(config.storage.journal_path())?)),
        StorageBackend::Null => Ok(Arc::new(NullStore)),
    }
}

/// In-memory index shared by the memory and file backends.
#[derive(Debug, Default)]
struct Index {
    processes: HashMap<String, Process>,
    /// Events keyed by process id, in append order.
    events: HashMap<String, Vec<StoredEvent>>,
    /// Last assigned event id.
    last_event_id: u64,
}

impl Index {
    /// Whether writing `process` would change stored state.
    fn accepts_process(&self, process: &Process) -> bool {
        let Some(existing) = self.processes.get(&process.id) else {
            return true;
        };

        if !existing.status.can_transition_to(process.status) {
            tracing::warn!(
                process_id = %process.id,
                stored = %existing.status,
                incoming = %process.status,
                "Ignoring status change of terminal process"
            );
            return false;
        }
        if existing.status.is_terminal() {
            tracing::debug!(process_id = %process.id, "Duplicate terminal process write");
            return false;
        }

        existing != process
    }

    fn insert_process(&mut self, process: Process) {
        self.processes.insert(process.id.clone(), process);
    }

    fn upsert_process(&mut self, process: Process) -> WriteOutcome<String> {
        let id = process.id.clone();
        if !self.accepts_process(&process) {
            return WriteOutcome::Unchanged(id);
        }
        self.insert_process(process);
        WriteOutcome::Stored(id)
    }

    /// Id of the stored write for the same step and status, if any.
    fn find_event(&self, event: &ProcessEvent) -> Option<u64> {
        let existing = self
            .events
            .get(&event.process_id)?
            .iter()
            .find(|stored| {
                stored.event.sequence == event.sequence && stored.event.status == event.status
            })?;

        tracing::debug!(
            process_id = %event.process_id,
            sequence = event.sequence,
            event_id = existing.id,
            "Duplicate process event write"
        );
        Some(existing.id)
    }

    fn push_event(&mut self, event: ProcessEvent) -> u64 {
        self.last_event_id += 1;
        let id = self.last_event_id;
        self.events
            .entry(event.process_id.clone())
            .or_default()
            .push(StoredEvent { id, event });
        id
    }

    fn append_event(&mut self, event: ProcessEvent) -> WriteOutcome<u64> {
        match self.find_event(&event) {
            Some(id) => WriteOutcome::Unchanged(id),
            None => WriteOutcome::Stored(self.push_event(event)),
        }
    }

    fn event_count(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    fn query(&self, filter: &ProcessFilter) -> Vec<Process> {
        let mut results: Vec<Process> = self
            .processes
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();

        results.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        results
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect()
    }

    fn events_for(&self, process_id: &str) -> Vec<StoredEvent> {
        self.events.get(process_id).cloned().unwrap_or_default()
    }
}

fn lock_error(e: impl std::fmt::Display) -> AuditError {
    AuditError::Storage(format!("failed to acquire lock: {e}"))
}

/// Memory storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    index: RwLock<Index>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessStore for MemoryStore {
    async fn upsert_process(&self, process: Process) -> Result<WriteOutcome<String>, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        Ok(index.upsert_process(process))
    }

    async fn append_event(&self, event: ProcessEvent) -> Result<WriteOutcome<u64>, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        Ok(index.append_event(event))
    }

    async fn get_process(&self, id: &str) -> Result<Option<Process>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.processes.get(id).cloned())
    }

    async fn query_processes(&self, filter: &ProcessFilter) -> Result<Vec<Process>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.query(filter))
    }

    async fn events_for(&self, process_id: &str) -> Result<Vec<StoredEvent>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.events_for(process_id))
    }
}

/// One line of the file journal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum JournalEntry {
    Process(Process),
    Event(ProcessEvent),
}

/// File storage: a JSON Lines journal of accepted writes.
///
/// The journal is replayed into memory when the store is opened, so queries
/// are served from the index.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    index: RwLock<Index>,
}

impl FileStore {
    /// Open (or create) the journal at `path` and replay it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let index = Self::replay(&path)?;
        tracing::info!(
            path = %path.display(),
            processes = index.processes.len(),
            events = index.event_count(),
            "Loaded audit journal"
        );

        Ok(Self {
            path,
            index: RwLock::new(index),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn replay(path: &Path) -> Result<Index, AuditError> {
        let mut index = Index::default();
        if !path.exists() {
            return Ok(index);
        }

        let reader = BufReader::new(fs::File::open(path)?);
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<JournalEntry>(line) {
                Ok(JournalEntry::Process(process)) => {
                    index.upsert_process(process);
                }
                Ok(JournalEntry::Event(event)) => {
                    index.append_event(event);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse journal entry on line {} of {}: {}",
                        line_num + 1,
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(index)
    }

    fn append(&self, entry: &JournalEntry) -> Result<(), AuditError> {
        let json = serde_json::to_string(entry)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

#[async_trait]
impl ProcessStore for FileStore {
    async fn upsert_process(&self, process: Process) -> Result<WriteOutcome<String>, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        let id = process.id.clone();
        if !index.accepts_process(&process) {
            return Ok(WriteOutcome::Unchanged(id));
        }

        // The index only learns about writes that reached the journal.
        self.append(&JournalEntry::Process(process.clone()))?;
        index.insert_process(process);
        Ok(WriteOutcome::Stored(id))
    }

    async fn append_event(&self, event: ProcessEvent) -> Result<WriteOutcome<u64>, AuditError> {
        let mut index = self.index.write().map_err(lock_error)?;
        if let Some(id) = index.find_event(&event) {
            return Ok(WriteOutcome::Unchanged(id));
        }

        self.append(&JournalEntry::Event(event.clone()))?;
        Ok(WriteOutcome::Stored(index.push_event(event)))
    }

    async fn get_process(&self, id: &str) -> Result<Option<Process>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.processes.get(id).cloned())
    }

    async fn query_processes(&self, filter: &ProcessFilter) -> Result<Vec<Process>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.query(filter))
    }

    async fn events_for(&self, process_id: &str) -> Result<Vec<StoredEvent>, AuditError> {
        let index = self.index.read().map_err(lock_error)?;
        Ok(index.events_for(process_id))
    }
}

/// Null storage (discards everything).
#[derive(Debug, Default)]
pub struct NullStore;

#[async_trait]
impl ProcessStore for NullStore {
    async fn upsert_process(&self, process: Process) -> Result<WriteOutcome<String>, AuditError> {
        Ok(WriteOutcome::Unchanged(process.id))
    }

    async fn append_event(&self, _event: ProcessEvent) -> Result<WriteOutcome<u64>, AuditError> {
        Ok(WriteOutcome::Unchanged(0))
    }

    async fn get_process(&self, _id: &str) -> Result<Option<Process>, AuditError> {
        Ok(None)
    }

    async fn query_processes(&self, _filter: &ProcessFilter) -> Result<Vec<Process>, AuditError> {
        Ok(vec![])
    }

    async fn events_for(&self, _process_id: &str) -> Result<Vec<StoredEvent>, AuditError> {
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessStatus;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn process(id: &str, org_id: u32) -> Process {
        Process {
            id: id.to_string(),
            parent_id: String::new(),
            org_id,
            process_type: "create-cluster".to_string(),
            log: String::new(),
            resource_id: "cluster-42".to_string(),
            status: ProcessStatus::Running,
            started_at: t0(),
            finished_at: None,
        }
    }

    fn finished(mut p: Process) -> Process {
        p.status = ProcessStatus::Finished;
        p.finished_at = Some(p.started_at + Duration::seconds(30));
        p
    }

    fn event(process_id: &str, sequence: u64, status: ProcessStatus) -> ProcessEvent {
        ProcessEvent {
            process_id: process_id.to_string(),
            sequence,
            event_type: "create-worker-pool".to_string(),
            log: String::new(),
            status,
            timestamp: t0(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_upsert() {
        let store = MemoryStore::new();

        let outcome = store.upsert_process(process("wf-1", 7)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Stored("wf-1".to_string()));

        store
            .upsert_process(finished(process("wf-1", 7)))
            .await
            .unwrap();

        let stored = store.get_process("wf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessStatus::Finished);
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_process_is_never_rewritten() {
        let store = MemoryStore::new();
        let done = finished(process("wf-1", 7));
        store.upsert_process(done.clone()).await.unwrap();

        // Late redelivery of the initial write.
        let outcome = store.upsert_process(process("wf-1", 7)).await.unwrap();
        assert!(!outcome.is_stored());

        // Conflicting terminal write.
        let mut failed = done.clone();
        failed.status = ProcessStatus::Failed;
        failed.log = "boom".to_string();
        store.upsert_process(failed).await.unwrap();

        assert_eq!(store.get_process("wf-1").await.unwrap(), Some(done));
    }

    #[tokio::test]
    async fn test_duplicate_terminal_write_is_idempotent() {
        let store = MemoryStore::new();
        let done = finished(process("wf-1", 7));

        let first = store.upsert_process(done.clone()).await.unwrap();
        let second = store.upsert_process(done.clone()).await.unwrap();

        assert_eq!(first.into_inner(), second.into_inner());
        assert_eq!(store.get_process("wf-1").await.unwrap(), Some(done));
    }

    #[tokio::test]
    async fn test_events_dedup_and_order() {
        let store = MemoryStore::new();

        let a = store
            .append_event(event("wf-1", 1, ProcessStatus::Running))
            .await
            .unwrap();
        store
            .append_event(event("wf-2", 1, ProcessStatus::Running))
            .await
            .unwrap();
        let b = store
            .append_event(event("wf-1", 1, ProcessStatus::Finished))
            .await
            .unwrap();
        let again = store
            .append_event(event("wf-1", 1, ProcessStatus::Finished))
            .await
            .unwrap();

        assert_eq!(a, WriteOutcome::Stored(1));
        assert_eq!(b, WriteOutcome::Stored(3));
        assert_eq!(again, WriteOutcome::Unchanged(3));

        let events = store.events_for("wf-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event.status, ProcessStatus::Running);
        assert_eq!(events[1].event.status, ProcessStatus::Finished);
        assert_eq!(store.events_for("wf-2").await.unwrap().len(), 1);
        assert!(store.events_for("wf-3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_step_at_same_instant_keeps_every_row() {
        let store = MemoryStore::new();

        // Two create-stack steps of one process, opened and closed at t0.
        for sequence in [1, 2] {
            for status in [ProcessStatus::Running, ProcessStatus::Finished] {
                let outcome = store
                    .append_event(event("wf-1", sequence, status))
                    .await
                    .unwrap();
                assert!(outcome.is_stored());
            }
        }

        let events = store.events_for("wf-1").await.unwrap();
        assert_eq!(events.len(), 4);
        let ids: Vec<_> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_query_filters_and_pagination() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut p = process(&format!("wf-{i}"), if i % 2 == 0 { 7 } else { 8 });
            p.started_at = t0() + Duration::minutes(i);
            store.upsert_process(p).await.unwrap();
        }

        let org7 = store
            .query_processes(&ProcessFilter {
                org_id: Some(7),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = org7.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["wf-4", "wf-2", "wf-0"]);

        let page = store
            .query_processes(&ProcessFilter {
                limit: Some(2),
                offset: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["wf-3", "wf-2"]);
    }

    #[tokio::test]
    async fn test_file_store_replays_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("processes.log");

        {
            let store = FileStore::open(&path).unwrap();
            store.upsert_process(process("wf-1", 7)).await.unwrap();
            store
                .append_event(event("wf-1", 1, ProcessStatus::Running))
                .await
                .unwrap();
            store
                .upsert_process(finished(process("wf-1", 7)))
                .await
                .unwrap();
            // Absorbed, must not reach the journal.
            store.upsert_process(process("wf-1", 7)).await.unwrap();
        }

        let journal = fs::read_to_string(&path).unwrap();
        assert_eq!(journal.lines().count(), 3);

        let reopened = FileStore::open(&path).unwrap();
        let stored = reopened.get_process("wf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessStatus::Finished);
        assert_eq!(reopened.events_for("wf-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_retries_write_after_journal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.log");
        let store = FileStore::open(&path).unwrap();

        store.upsert_process(process("wf-1", 7)).await.unwrap();
        store
            .append_event(event("wf-1", 1, ProcessStatus::Finished))
            .await
            .unwrap();

        // A directory in place of the journal makes every append fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let done = finished(process("wf-1", 7));
        let closing = event("wf-1", 2, ProcessStatus::Failed);
        assert!(store.upsert_process(done.clone()).await.is_err());
        assert!(store.append_event(closing.clone()).await.is_err());

        // Nothing changed in memory either.
        let stored = store.get_process("wf-1").await.unwrap().unwrap();
        assert_eq!(stored.status, ProcessStatus::Running);
        assert_eq!(store.events_for("wf-1").await.unwrap().len(), 1);

        // Redelivery after the journal recovers.
        fs::remove_dir(&path).unwrap();
        let retried = store.upsert_process(done.clone()).await.unwrap();
        assert_eq!(retried, WriteOutcome::Stored("wf-1".to_string()));
        assert!(store.append_event(closing).await.unwrap().is_stored());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get_process("wf-1").await.unwrap(), Some(done));
        let events = reopened.events_for("wf-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.status, ProcessStatus::Failed);
    }

    #[tokio::test]
    async fn test_file_store_skips_corrupt_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processes.log");

        let line = serde_json::to_string(&JournalEntry::Process(process("wf-1", 7))).unwrap();
        fs::write(&path, format!("not json\n{line}\n\n")).unwrap();

        let store = FileStore::open(&path).unwrap();
        assert!(store.get_process("wf-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_null_store() {
        let store = NullStore;
        let outcome = store.upsert_process(process("wf-1", 7)).await.unwrap();
        assert_eq!(outcome.into_inner(), "wf-1");
        assert!(store.get_process("wf-1").await.unwrap().is_none());
    }

    #[test]
    fn test_create_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AuditConfig::default();
        config.storage.backend = StorageBackend::File;
        config.storage.directory = dir.path().to_path_buf();

        assert!(create_store(&config).is_ok());
        assert!(dir.path().exists());
    }
}
