//! Fjall-based persistence layer: the spec's Metadata Store (§2, §6.4).
//!
//! This module is the only place that durably stores Processes, Documents,
//! and Jobs. It uses Fjall (an embedded LSM key-value store) with five
//! partitions:
//!
//! - `processes` — one row per materialized process
//! - `documents` — one row per document, keyed by `(processRef, documentId)`
//! - `jobs` — one row per job, keyed by `jobId`
//! - `active_jobs` — the `(processRef, is_active)` uniqueness constraint (I3)
//! - `metadata` — operator bookkeeping (pruning cursors)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use processvault::ledger::FjallStore;
//!
//! let store = FjallStore::open("data/ledger")?;
//! store.upsert_process(&process)?;
//! let process = store.get_process("2024.001")?;
//! ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::{PruneStats, RETENTION_JOBS_DAYS};
pub use store::{FjallStore, StoreStats};
