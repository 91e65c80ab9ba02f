use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A broker ticket (spec §6.5): carries nothing but the job id. Workers
/// always re-read the job from the Metadata Store, so a stale or
/// re-delivered ticket is harmless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub job_id: String,
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("ticket not found: seq={0}")]
    TicketNotFound(u64),
}

pub type Result<T> = std::result::Result<T, QueueError>;

/// FjallQueue durably persists broker tickets before they are handed to a
/// worker, so a crash between persistence and dispatch can be recovered by
/// replaying `pending()` into the worker channels again (spec's at-least-
/// once delivery, §2 item 4).
///
/// - `tickets` partition: u64 (big-endian seq) -> Ticket (JSON)
/// - `metadata` partition: "next_seq" -> u64 (atomic counter)
pub struct FjallQueue {
    keyspace: Keyspace,
    tickets: PartitionHandle,
    metadata: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
}

impl FjallQueue {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening FjallQueue at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;

        let tickets = keyspace.open_partition("tickets", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(b"next_seq")?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        info!("FjallQueue opened, current sequence: {}", current_seq);

        Ok(Self {
            keyspace,
            tickets,
            metadata,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
        })
    }

    /// Persists a ticket and returns its sequence number.
    pub fn enqueue(&self, ticket: &Ticket) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);

        let value = serde_json::to_vec(ticket)?;
        self.tickets.insert(seq.to_be_bytes(), value)?;
        self.metadata
            .insert(b"next_seq", (seq + 1).to_be_bytes())?;

        debug!(seq, job_id = %ticket.job_id, "ticket enqueued");
        Ok(seq)
    }

    pub fn get(&self, seq: u64) -> Result<Option<Ticket>> {
        match self.tickets.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Marks a ticket as delivered and processed. Called by a worker once
    /// `run_job` returns without a `StorageWrite`-class error (spec §4.2
    /// step 9, "acknowledge ticket").
    pub fn ack(&self, seq: u64) -> Result<()> {
        self.tickets.remove(seq.to_be_bytes())?;
        debug!(seq, "ticket acked");
        Ok(())
    }

    /// All tickets still sitting un-acked, oldest first. Replayed into the
    /// worker channels on startup to emulate the broker's at-least-once
    /// redelivery after a crash (spec §4.2 "broker redelivers").
    pub fn pending(&self) -> Result<Vec<(u64, Ticket)>> {
        let mut out = Vec::new();
        for item in self.tickets.iter() {
            let (key, value) = item?;
            let seq = u64::from_be_bytes(key.as_ref().try_into().unwrap_or([0u8; 8]));
            out.push((seq, serde_json::from_slice(&value)?));
        }
        out.sort_by_key(|(seq, _)| *seq);
        Ok(out)
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ticket(job_id: &str) -> Ticket {
        Ticket { job_id: job_id.to_string() }
    }

    #[test]
    fn enqueue_and_retrieve() {
        let temp_dir = TempDir::new().unwrap();
        let queue = FjallQueue::open(temp_dir.path()).unwrap();

        let seq = queue.enqueue(&ticket("job1")).unwrap();
        assert_eq!(seq, 0);

        let retrieved = queue.get(seq).unwrap().unwrap();
        assert_eq!(retrieved.job_id, "job1");
    }

    #[test]
    fn sequential_ids() {
        let temp_dir = TempDir::new().unwrap();
        let queue = FjallQueue::open(temp_dir.path()).unwrap();

        assert_eq!(queue.enqueue(&ticket("job1")).unwrap(), 0);
        assert_eq!(queue.enqueue(&ticket("job2")).unwrap(), 1);
        assert_eq!(queue.enqueue(&ticket("job3")).unwrap(), 2);
    }

    #[test]
    fn ack_removes_ticket_from_pending() {
        let temp_dir = TempDir::new().unwrap();
        let queue = FjallQueue::open(temp_dir.path()).unwrap();

        let seq = queue.enqueue(&ticket("job1")).unwrap();
        assert_eq!(queue.pending().unwrap().len(), 1);

        queue.ack(seq).unwrap();
        assert_eq!(queue.pending().unwrap().len(), 0);
    }

    #[test]
    fn persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();

        {
            let queue = FjallQueue::open(temp_dir.path()).unwrap();
            queue.enqueue(&ticket("job1")).unwrap();
        }

        let queue = FjallQueue::open(temp_dir.path()).unwrap();
        assert_eq!(queue.current_seq(), 1);
        assert_eq!(queue.pending().unwrap().len(), 1);

        let seq2 = queue.enqueue(&ticket("job2")).unwrap();
        assert_eq!(seq2, 1);
    }
}
