//! The spec's Job Scheduler (§4.1): given `(processNumber, webhookUrl?,
//! autoDownload)`, decides one of three outcomes and returns before any
//! download begins.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::domain::{Document, DocumentStatus, Job, Process};
use crate::ledger::{FjallStore, LedgerError};
use crate::observability::Metrics;
use crate::queue::Broker;
use crate::status::{self, WebhookUrlError};
use crate::storage::StorageClient;
use crate::upstream::UpstreamClient;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid webhook url: {0}")]
    InvalidWebhook(#[from] WebhookUrlError),

    #[error("process number must not be empty")]
    EmptyProcessNumber,

    #[error("upstream metadata unavailable: {0}")]
    UpstreamMetadataUnavailable(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("broker error: {0}")]
    Broker(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    ReusedActive,
    ReusedComplete,
    Admitted,
}

/// A document ready to be surfaced to the caller, with a freshly re-signed
/// `download_url` when it is AVAILABLE (spec §4.1 outcome 2).
#[derive(Debug, Clone)]
pub struct ProjectedDocument {
    pub document: Document,
    pub download_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AdmissionResult {
    pub job_id: String,
    pub decision: AdmissionDecision,
    pub process: Process,
    pub documents: Vec<ProjectedDocument>,
}

/// Drives the three-way admission decision described in spec §4.1. Holds
/// the collaborators it needs as explicit dependencies (spec §9: "pass
/// explicit dependencies... into Scheduler and Worker constructors").
pub struct JobScheduler {
    store: Arc<FjallStore>,
    broker: Arc<Broker>,
    upstream: Arc<dyn UpstreamClient>,
    storage: Arc<StorageClient>,
    config: SchedulerConfig,
    production: bool,
    presigned_url_ttl: Duration,
    metrics: Arc<Metrics>,
}

impl JobScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<FjallStore>,
        broker: Arc<Broker>,
        upstream: Arc<dyn UpstreamClient>,
        storage: Arc<StorageClient>,
        config: SchedulerConfig,
        production: bool,
        presigned_url_ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            broker,
            upstream,
            storage,
            config,
            production,
            presigned_url_ttl,
            metrics,
        }
    }

    /// Runs the admission decision for `process_number` (spec §4.1).
    pub async fn admit(
        &self,
        process_number: &str,
        webhook_url: Option<String>,
        auto_download: Option<bool>,
    ) -> Result<AdmissionResult, SchedulerError> {
        if process_number.trim().is_empty() {
            return Err(SchedulerError::EmptyProcessNumber);
        }

        if let Some(url) = &webhook_url {
            status::validate_webhook_url(url, self.production)?;
        }

        let auto_download = auto_download.unwrap_or(self.config.auto_download_default);

        // Outcome 1: reuse active job.
        if let Some(active_job_id) = self.store.get_active_job_id(process_number)? {
            let job = self
                .store
                .get_job(&active_job_id)?
                .ok_or_else(|| SchedulerError::Ledger(LedgerError::JobNotFound(active_job_id.clone())))?;
            let process = self
                .store
                .get_process(process_number)?
                .ok_or_else(|| SchedulerError::Ledger(LedgerError::ProcessNotFound(process_number.to_string())))?;
            let documents = self.project_documents(process_number).await?;

            info!(process_number, job_id = %job.job_id, "reusing active job");
            self.metrics.job_reused_active();
            return Ok(AdmissionResult {
                job_id: job.job_id,
                decision: AdmissionDecision::ReusedActive,
                process,
                documents,
            });
        }

        // Ensure the process (and its document rows) are known before
        // deciding between outcomes 2 and 3.
        let process = self.ensure_process(process_number).await?;
        let documents = self.store.list_documents(process_number)?;

        // Outcome 2: reuse completed result.
        if !documents.is_empty() && documents.iter().all(|d| d.status == DocumentStatus::Available) {
            let last_job_id = self.store.get_last_job_id(process_number)?;
            let projected = self.project_documents(process_number).await?;

            info!(process_number, "reusing completed result, re-signing urls");
            self.metrics.job_reused_complete();
            return Ok(AdmissionResult {
                job_id: last_job_id.unwrap_or_default(),
                decision: AdmissionDecision::ReusedComplete,
                process,
                documents: projected,
            });
        }

        // Outcome 3: admit new job.
        let start_processing = webhook_url.is_none();
        for document in &documents {
            if document.status == DocumentStatus::Pending && start_processing {
                let mut document = document.clone();
                document.status = DocumentStatus::Processing;
                self.store.upsert_document(&document)?;
            }
        }

        let job_id = Uuid::new_v4().to_string();
        let mut job = Job::new(job_id.clone(), process_number.to_string(), webhook_url);
        job.total_documents = documents.len();

        match self.store.admit_job(&job) {
            Ok(()) => {}
            Err(LedgerError::ActiveJobExists(_)) => {
                // Lost the race to a concurrent admitter (spec §4.1
                // idempotency guarantee): read and return their job.
                let active_job_id = self
                    .store
                    .get_active_job_id(process_number)?
                    .ok_or(SchedulerError::Ledger(LedgerError::ActiveJobExists(process_number.to_string())))?;
                let job = self
                    .store
                    .get_job(&active_job_id)?
                    .ok_or_else(|| SchedulerError::Ledger(LedgerError::JobNotFound(active_job_id.clone())))?;
                let documents = self.project_documents(process_number).await?;
                warn!(process_number, job_id = %job.job_id, "lost admission race, reusing winner's job");
                self.metrics.job_reused_active();
                return Ok(AdmissionResult {
                    job_id: job.job_id,
                    decision: AdmissionDecision::ReusedActive,
                    process,
                    documents,
                });
            }
            Err(e) => return Err(e.into()),
        }

        if auto_download {
            self.broker
                .enqueue(job_id.clone())
                .await
                .map_err(|e| SchedulerError::Broker(e.to_string()))?;
        } else {
            info!(
                process_number,
                job_id, "admitted job with autoDownload=false; no ticket enqueued, download must be started separately"
            );
        }

        self.metrics.job_admitted();
        let projected = self.project_documents(process_number).await?;
        Ok(AdmissionResult {
            job_id,
            decision: AdmissionDecision::Admitted,
            process,
            documents: projected,
        })
    }

    /// Loads the process from the Metadata Store, or fetches it from the
    /// Upstream Client and seeds its Document rows if unknown (spec §4.1
    /// step 3).
    async fn ensure_process(&self, process_number: &str) -> Result<Process, SchedulerError> {
        if let Some(process) = self.store.get_process(process_number)? {
            return Ok(process);
        }

        let metadata = self
            .upstream
            .fetch_process(process_number)
            .await
            .map_err(|e| SchedulerError::UpstreamMetadataUnavailable(e.to_string()))?;

        let process = Process::new(process_number.to_string(), metadata.summary, !metadata.documents.is_empty());
        self.store.upsert_process(&process)?;

        for listing in &metadata.documents {
            let document = Document::new_pending(
                process_number,
                &listing.document_id,
                &listing.name,
                &listing.source_handle,
                false,
            );
            self.store.upsert_document(&document)?;
        }

        info!(process_number, documents = metadata.documents.len(), "materialized new process from upstream");
        Ok(process)
    }

    /// Attaches a fresh pre-signed `download_url` to every AVAILABLE
    /// document (spec §4.5: "never cached... re-sign on every request").
    async fn project_documents(&self, process_number: &str) -> Result<Vec<ProjectedDocument>, SchedulerError> {
        let documents = self.store.list_documents(process_number)?;
        let mut projected = Vec::with_capacity(documents.len());

        for document in documents {
            let download_url = match (&document.status, &document.blob_key) {
                (DocumentStatus::Available, Some(key)) => Some(
                    self.storage
                        .presign_read(key, self.presigned_url_ttl)
                        .await
                        .map_err(|e| SchedulerError::StorageUnavailable(e.to_string()))?,
                ),
                _ => None,
            };
            projected.push(ProjectedDocument { document, download_url });
        }

        Ok(projected)
    }
}
