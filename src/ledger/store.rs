use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use crate::domain::{Document, DocumentStatus, Job, JobStatus, Process};
use crate::status;

use super::error::{LedgerError, Result};
use super::partitions::{
    encode_active_job_key, encode_document_key, encode_document_prefix, encode_job_key,
    encode_last_job_key, encode_process_key,
};
use super::pruning::{self, PruneStats};

/// Fjall-backed Metadata Store: processes, documents, jobs, and the
/// `(processRef, is_active)` uniqueness constraint from spec §6.4.
///
/// Fjall gives us no cross-key transactions, so the admission check (has
/// this process got an active job already?) and the subsequent insert are
/// serialized behind an in-process mutex. That is sufficient here because
/// there is exactly one `FjallStore` per running service instance; it does
/// not protect against two separate processes sharing one Fjall directory,
/// which this design never does.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    processes: PartitionHandle,
    documents: PartitionHandle,
    jobs: PartitionHandle,
    active_jobs: PartitionHandle,
    last_jobs: PartitionHandle,
    metadata: PartitionHandle,
    admission_lock: std::sync::Arc<Mutex<()>>,
}

impl FjallStore {
    /// Open or create a Fjall store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening Fjall store at: {}", path.display());

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;

        let processes = keyspace.open_partition("processes", PartitionCreateOptions::default())?;
        let documents = keyspace.open_partition("documents", PartitionCreateOptions::default())?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let active_jobs =
            keyspace.open_partition("active_jobs", PartitionCreateOptions::default())?;
        let last_jobs = keyspace.open_partition("last_jobs", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        info!("Fjall store opened successfully");
        Ok(Self {
            keyspace,
            processes,
            documents,
            jobs,
            active_jobs,
            last_jobs,
            metadata,
            admission_lock: std::sync::Arc::new(Mutex::new(())),
        })
    }

    // -- processes ----------------------------------------------------------

    pub fn upsert_process(&self, process: &Process) -> Result<()> {
        let key = encode_process_key(&process.process_number);
        let value = serde_json::to_vec(process)?;
        self.processes.insert(key, value)?;
        debug!(process_number = %process.process_number, "upserted process");
        Ok(())
    }

    pub fn get_process(&self, process_number: &str) -> Result<Option<Process>> {
        let key = encode_process_key(process_number);
        match self.processes.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    // -- documents ------------------------------------------------------------

    pub fn upsert_document(&self, document: &Document) -> Result<()> {
        let key = encode_document_key(&document.process_ref, &document.document_id);
        let value = serde_json::to_vec(document)?;
        self.documents.insert(key, value)?;
        Ok(())
    }

    pub fn get_document(&self, process_number: &str, document_id: &str) -> Result<Option<Document>> {
        let key = encode_document_key(process_number, document_id);
        match self.documents.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub fn list_documents(&self, process_number: &str) -> Result<Vec<Document>> {
        let prefix = encode_document_prefix(process_number);
        let mut docs = Vec::new();
        for item in self.documents.prefix(&prefix) {
            let (_, value) = item?;
            docs.push(serde_json::from_slice(&value)?);
        }
        Ok(docs)
    }

    /// Validates `document.status -> to` against the Status Manager's table
    /// (spec §4.3 / I6) before mutating and persisting. The caller supplies
    /// a closure to set any other fields (timestamps, error message) that
    /// go along with the transition.
    pub fn commit_document_transition(
        &self,
        document: &mut Document,
        to: DocumentStatus,
        apply: impl FnOnce(&mut Document),
    ) -> Result<()> {
        status::check_document_transition(document.status, to)?;
        document.status = to;
        apply(document);
        self.upsert_document(document)
    }

    /// Safety-net escape for documents only (spec §4.3 exception): forces
    /// FAILED regardless of the table, logging loudly that it did so.
    pub fn force_document_failed(&self, document: &mut Document, error_message: String) -> Result<()> {
        if !status::document_transition_allowed(document.status, DocumentStatus::Failed) {
            warn!(
                document_id = %document.document_id,
                from = ?document.status,
                "forcing document to FAILED despite invalid transition"
            );
        }
        document.status = DocumentStatus::Failed;
        document.error_message = Some(error_message);
        self.upsert_document(document)
    }

    // -- jobs -------------------------------------------------------------------

    pub fn upsert_job(&self, job: &Job) -> Result<()> {
        let key = encode_job_key(&job.job_id);
        let value = serde_json::to_vec(job)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %job.job_id, status = ?job.status, "upserted job");
        Ok(())
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let key = encode_job_key(job_id);
        match self.jobs.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Validates `job.status -> to` against the Status Manager's table
    /// before mutating and persisting. Unlike documents, jobs never get a
    /// force-FAILED escape (spec §9 open question, resolved: forbidden).
    pub fn commit_job_transition(
        &self,
        job: &mut Job,
        to: JobStatus,
        apply: impl FnOnce(&mut Job),
    ) -> Result<()> {
        status::check_job_transition(job.status, to)?;
        job.status = to;
        apply(job);
        if job.status.is_terminal() {
            self.clear_active_job(&job.process_ref)?;
        }
        self.upsert_job(job)
    }

    /// Id of the currently active job for a process, if any (spec I3).
    pub fn get_active_job_id(&self, process_number: &str) -> Result<Option<String>> {
        let key = encode_active_job_key(process_number);
        match self.active_jobs.get(key)? {
            Some(value) => Ok(Some(String::from_utf8_lossy(&value).to_string())),
            None => Ok(None),
        }
    }

    /// Id of the most recently admitted job for a process, terminal or not.
    /// Kept around after the active marker is cleared so the Status
    /// Projection can still report which job last touched this process.
    pub fn get_last_job_id(&self, process_number: &str) -> Result<Option<String>> {
        let key = encode_last_job_key(process_number);
        match self.last_jobs.get(key)? {
            Some(value) => Ok(Some(String::from_utf8_lossy(&value).to_string())),
            None => Ok(None),
        }
    }

    /// Admits a brand-new job for `process_number`, enforcing (I3): if an
    /// active job already exists, returns `ActiveJobExists` without
    /// mutating anything, and the caller is expected to re-read and reuse
    /// that job (spec §4.1 "Reuse active job").
    pub fn admit_job(&self, job: &Job) -> Result<()> {
        let _guard = self.admission_lock.lock().unwrap();

        if self.get_active_job_id(&job.process_ref)?.is_some() {
            return Err(LedgerError::ActiveJobExists(job.process_ref.clone()));
        }

        let job_key = encode_job_key(&job.job_id);
        let active_key = encode_active_job_key(&job.process_ref);
        let last_key = encode_last_job_key(&job.process_ref);
        self.jobs.insert(job_key, serde_json::to_vec(job)?)?;
        self.active_jobs.insert(active_key, job.job_id.as_bytes())?;
        self.last_jobs.insert(last_key, job.job_id.as_bytes())?;

        debug!(job_id = %job.job_id, process_number = %job.process_ref, "admitted job");
        Ok(())
    }

    /// Clears the active-job marker for a process once its job reaches a
    /// terminal state, so a future request can admit a new one. The
    /// last-job pointer is left untouched.
    pub fn clear_active_job(&self, process_number: &str) -> Result<()> {
        let key = encode_active_job_key(process_number);
        self.active_jobs.remove(key)?;
        Ok(())
    }

    pub fn prune_expired_jobs(&self, ttl: Duration) -> Result<PruneStats> {
        info!("starting job pruning");
        let stats = pruning::prune_expired_jobs(&self.jobs, &self.metadata, ttl)?;
        info!(?stats, "job pruning complete");
        Ok(stats)
    }

    /// Persist all pending writes to disk.
    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut process_count = 0;
        let mut document_count = 0;
        let mut job_count = 0;

        for item in self.processes.iter() {
            item?;
            process_count += 1;
        }
        for item in self.documents.iter() {
            item?;
            document_count += 1;
        }
        for item in self.jobs.iter() {
            item?;
            job_count += 1;
        }

        Ok(StoreStats {
            process_count,
            document_count,
            job_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub process_count: usize,
    pub document_count: usize,
    pub job_count: usize,
}
