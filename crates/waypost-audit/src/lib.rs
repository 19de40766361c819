//! # waypost-audit
//!
//! Audit trail for long-running orchestrated operations.
//!
//! This crate provides:
//! - [`Process`] and [`ProcessEvent`] records with the shared
//!   [`ProcessStatus`] lifecycle (`running -> finished | failed`)
//! - the [`ProcessService`] write contract used by the logging activities
//! - [`AuditService`], which stores records through a [`ProcessStore`]
//!   backend (memory, JSON Lines file, or null) and answers queries
//!
//! ## Storage discipline
//!
//! Writes are idempotent upserts. A process that reached a terminal status
//! is never rewritten, and an event identical to one already stored for the
//! same process is not appended twice. This keeps redelivered activity
//! calls harmless.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use waypost_audit::{AuditService, ProcessFilter, ProcessStatus};
//! use waypost_core::AuditConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = AuditService::new(AuditConfig::default())?;
//!
//! let running = service
//!     .list_processes(&ProcessFilter {
//!         status: Some(ProcessStatus::Running),
//!         ..Default::default()
//!     })
//!     .await?;
//! println!("{} processes still running", running.len());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod process;
pub mod service;
pub mod storage;

pub use error::AuditError;
pub use process::{Process, ProcessEvent, ProcessStatus, StoredEvent};
pub use service::{AuditService, ProcessDetails, ProcessFilter, ProcessService};
pub use storage::{FileStore, MemoryStore, NullStore, ProcessStore, WriteOutcome, create_store};
