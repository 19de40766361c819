//! Audit trail configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the process audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit records are stored at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory holding the journal (file backend).
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Journal file name inside `directory`.
    #[serde(default = "default_journal_file")]
    pub journal_file: String,
}

impl StorageConfig {
    /// Full path of the journal file.
    pub fn journal_path(&self) -> PathBuf {
        self.directory.join(&self.journal_file)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            directory: default_directory(),
            journal_file: default_journal_file(),
        }
    }
}

/// Storage backend type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Keep records in process memory.
    #[default]
    Memory,
    /// Append records to a JSON Lines journal.
    File,
    /// Discard everything.
    Null,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            storage: StorageConfig::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("audit")
}

fn default_journal_file() -> String {
    "processes.log".to_string()
}
