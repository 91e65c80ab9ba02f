//! Retention: drops terminal Jobs (and their Documents) past their TTL.
//!
//! This is an operator concern, not part of the core pipeline (spec §1), but
//! every long-running store needs a bound on how much terminal history it
//! keeps. Pruning never touches an active Job (PENDING/PROCESSING) or its
//! Documents, regardless of age.

use std::time::{Duration, SystemTime};

use fjall::PartitionHandle;
use tracing::info;

use crate::domain::{Job, JobStatus};

use super::error::Result;
use super::partitions::{encode_document_prefix, encode_meta_key};

pub const RETENTION_JOBS_DAYS: u64 = 30;

const META_LAST_PRUNE: &str = "last_prune_jobs";

#[derive(Debug, Default, Clone, Copy)]
pub struct PruneStats {
    pub jobs_pruned: usize,
    pub documents_pruned: usize,
}

/// Removes terminal Jobs whose `completed_at` is older than `ttl`, along
/// with the Documents of the process they belonged to (if that process has
/// no other job referencing them) is intentionally *not* attempted here:
/// Documents are keyed by `(processRef, documentId)`, not by job, so a
/// process with a newer job would lose its documents too. Pruning therefore
/// only ever removes the Job record itself; Documents are pruned solely via
/// `prune_process_documents` when a caller explicitly asks to forget a
/// whole process.
pub fn prune_expired_jobs(
    jobs: &PartitionHandle,
    metadata: &PartitionHandle,
    ttl: Duration,
) -> Result<PruneStats> {
    let cutoff = SystemTime::now()
        .checked_sub(ttl)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let cutoff = chrono::DateTime::<chrono::Utc>::from(cutoff);

    let mut stats = PruneStats::default();

    for item in jobs.iter() {
        let (key, value) = item?;
        let job: Job = serde_json::from_slice(&value)?;
        if !job.status.is_terminal() {
            continue;
        }
        let Some(completed_at) = job.completed_at else {
            continue;
        };
        if completed_at < cutoff {
            jobs.remove(&key)?;
            stats.jobs_pruned += 1;
        }
    }

    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    metadata.insert(encode_meta_key(META_LAST_PRUNE), now.to_string().as_bytes())?;

    info!(jobs_pruned = stats.jobs_pruned, "pruned expired jobs");
    Ok(stats)
}

/// Removes every Document row belonging to `process_number`. Used by
/// operator tooling when a process is being forgotten entirely; never
/// called by the core pipeline itself.
pub fn prune_process_documents(
    documents: &PartitionHandle,
    process_number: &str,
) -> Result<usize> {
    let prefix = encode_document_prefix(process_number);
    let mut removed = 0;
    for item in documents.prefix(&prefix) {
        let (key, _) = item?;
        documents.remove(&key)?;
        removed += 1;
    }
    Ok(removed)
}
