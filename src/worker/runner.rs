//! The spec's Document Worker (§4.2): drives one Job from PENDING to a
//! terminal state, one ticket at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::domain::{Document, DocumentStatus, Job, JobStatus};
use crate::ledger::{FjallStore, LedgerError};
use crate::observability::Metrics;
use crate::queue::{Broker, QueueError, Ticket};
use crate::status;
use crate::storage::StorageClient;
use crate::upstream::{UpstreamClient, UpstreamError};
use crate::webhook::{DeliveryOutcome, WebhookDispatcher, WebhookDocument, WebhookPayload};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("document task panicked: {0}")]
    Join(String),
}

enum DocumentOutcome {
    Available,
    Failed,
}

/// Drives Jobs dequeued from the Broker (spec §4.2). Holds its
/// collaborators as explicit dependencies (spec §9) so tests can inject
/// fakes for the Upstream Client and Webhook Dispatcher.
#[derive(Clone)]
pub struct DocumentWorker {
    store: Arc<FjallStore>,
    broker: Arc<Broker>,
    upstream: Arc<dyn UpstreamClient>,
    storage: Arc<StorageClient>,
    webhook: Arc<dyn WebhookDispatcher>,
    config: WorkerConfig,
    presigned_url_ttl: Duration,
    metrics: Arc<Metrics>,
}

impl DocumentWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<FjallStore>,
        broker: Arc<Broker>,
        upstream: Arc<dyn UpstreamClient>,
        storage: Arc<StorageClient>,
        webhook: Arc<dyn WebhookDispatcher>,
        config: WorkerConfig,
        presigned_url_ttl: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, broker, upstream, storage, webhook, config, presigned_url_ttl, metrics }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Processes a single dequeued ticket (spec §4.2 steps 1-9). Returns an
    /// error only for conditions that must abort without acknowledging the
    /// ticket (`StorageWrite`-class failures, spec §7): the broker then
    /// redelivers and the PENDING-guard in step 1 decides whether to retry.
    pub async fn run_ticket(&self, ticket: &Ticket) -> Result<(), WorkerError> {
        let mut job = match self.store.get_job(&ticket.job_id)? {
            Some(job) => job,
            None => {
                warn!(job_id = %ticket.job_id, "ticket references unknown job, acknowledging and dropping");
                return Ok(());
            }
        };

        // Step 1: PENDING-guard. At-least-once delivery means a second
        // consumer may see a job another worker already advanced.
        if job.status != JobStatus::Pending {
            debug!(job_id = %job.job_id, status = ?job.status, "job already past PENDING, skipping");
            return Ok(());
        }

        // Step 2.
        self.store
            .commit_job_transition(&mut job, JobStatus::Processing, |j| j.started_at = Some(Utc::now()))?;

        // Step 3.
        let documents = self.store.list_documents(&job.process_ref)?;
        job.total_documents = documents.len();
        self.store.upsert_job(&job)?;

        // Step 4-6: batches of B, awaiting the whole batch before the next.
        let mut cancelled = false;
        for batch in documents.chunks(self.config.batch_size.max(1)) {
            if self.job_was_cancelled(&job.job_id)? {
                cancelled = true;
                break;
            }

            let mut tasks = tokio::task::JoinSet::new();
            for document in batch {
                let worker = self.clone();
                let document = document.clone();
                tasks.spawn(async move { worker.process_document(document).await });
            }

            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.map_err(|e| WorkerError::Join(e.to_string()))??;
                match outcome {
                    DocumentOutcome::Available => job.completed_documents += 1,
                    DocumentOutcome::Failed => job.failed_documents += 1,
                }
                job.recompute_progress();
                self.store.upsert_job(&job)?;
            }
        }

        if cancelled {
            info!(job_id = %job.job_id, "job cancelled, stopping without scheduling further batches");
            self.store
                .commit_job_transition(&mut job, JobStatus::Cancelled, |j| j.completed_at = Some(Utc::now()))?;
            return Ok(());
        }

        // Step 7.
        let terminal_status = if job.failed_documents == 0 { JobStatus::Completed } else { JobStatus::Failed };
        self.store
            .commit_job_transition(&mut job, terminal_status, |j| j.completed_at = Some(Utc::now()))?;
        info!(job_id = %job.job_id, status = ?job.status, completed = job.completed_documents, failed = job.failed_documents, "job reached terminal state");
        match terminal_status {
            JobStatus::Completed => self.metrics.job_completed(),
            JobStatus::Failed => self.metrics.job_failed(),
            _ => {}
        }

        // Step 8.
        if let Some(url) = job.webhook_url.clone() {
            self.dispatch_webhook(&mut job, &url).await?;
        }

        Ok(())
    }

    fn job_was_cancelled(&self, job_id: &str) -> Result<bool, WorkerError> {
        Ok(self
            .store
            .get_job(job_id)?
            .map(|j| j.status == JobStatus::Cancelled)
            .unwrap_or(false))
    }

    /// Runs the per-document retry loop (spec §4.2 step 5). The transition
    /// into PROCESSING happens once, before the first attempt; subsequent
    /// retries reuse that PROCESSING state rather than re-entering it (the
    /// Status Manager's table has no PROCESSING -> PROCESSING edge), and
    /// only the final AVAILABLE/FAILED transition closes it out.
    async fn process_document(&self, mut document: Document) -> Result<DocumentOutcome, WorkerError> {
        if !status::document_transition_allowed(document.status, DocumentStatus::Processing) {
            // Already terminal (AVAILABLE) or otherwise not retryable-from;
            // do not downgrade (spec §4.2 step 5a).
            return Ok(match document.status {
                DocumentStatus::Available => DocumentOutcome::Available,
                _ => DocumentOutcome::Failed,
            });
        }

        self.store
            .commit_document_transition(&mut document, DocumentStatus::Processing, |d| {
                d.download_started_at = Some(Utc::now());
            })?;

        let max_retries = self.config.max_retries.max(1);
        let backoff_base = self.config.retry_backoff_base();
        let mut last_error = String::new();

        for attempt in 1..=max_retries {
            match self.fetch_and_store(&document).await {
                Ok((blob_key, size, mime_type)) => {
                    self.store.commit_document_transition(&mut document, DocumentStatus::Available, |d| {
                        d.blob_key = Some(blob_key);
                        d.size = Some(size);
                        d.mime_type = mime_type;
                        d.download_completed_at = Some(Utc::now());
                        d.error_message = None;
                    })?;
                    debug!(document_id = %document.document_id, attempt, "document downloaded");
                    self.metrics.document_downloaded();
                    return Ok(DocumentOutcome::Available);
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(document_id = %document.document_id, attempt, error = %last_error, "document fetch attempt failed");
                    if attempt < max_retries {
                        tokio::time::sleep(backoff_base * 2u32.pow(attempt - 1)).await;
                    }
                }
            }
        }

        self.store.commit_document_transition(&mut document, DocumentStatus::Failed, |d| {
            d.error_message = Some(format!("failed after {max_retries} attempts: {last_error}"));
        })?;
        self.metrics.document_failed();
        Ok(DocumentOutcome::Failed)
    }

    async fn fetch_and_store(&self, document: &Document) -> Result<(String, u64, Option<String>), UpstreamError> {
        let fetched = self.upstream.fetch_document(&document.source_handle).await?;
        let key = format!(
            "processes/{}/documents/{}/{}",
            document.process_ref, document.document_id, document.name
        );
        let size = fetched.bytes.len() as u64;

        self.storage
            .upload(&key, fetched.bytes)
            .await
            .map_err(|e| UpstreamError::Transient(format!("storage upload failed: {e}")))?;

        Ok((key, size, fetched.mime_type))
    }

    /// Step 8: invoke the Webhook Dispatcher and record the outcome onto
    /// the Job. A failed delivery never changes the Job's terminal status
    /// (spec §7).
    async fn dispatch_webhook(&self, job: &mut Job, url: &str) -> Result<(), WorkerError> {
        let documents = self.store.list_documents(&job.process_ref)?;
        let mut webhook_documents = Vec::with_capacity(documents.len());
        for document in &documents {
            let download_url = match (&document.status, &document.blob_key) {
                (DocumentStatus::Available, Some(key)) => {
                    self.storage.presign_read(key, self.presigned_url_ttl).await.ok()
                }
                _ => None,
            };
            webhook_documents.push(WebhookDocument::from_document(document, download_url));
        }

        let payload = WebhookPayload::from_job(job, webhook_documents);
        let outcome: DeliveryOutcome = self.webhook.deliver(url, &payload, &job.job_id).await;

        job.webhook_sent = outcome.success;
        job.webhook_sent_at = outcome.sent_at;
        job.webhook_attempts = outcome.attempts;
        job.webhook_last_error = outcome.last_error;
        self.store.upsert_job(job)?;

        if outcome.success {
            info!(job_id = %job.job_id, attempts = outcome.attempts, "webhook delivered");
            self.metrics.webhook_sent();
        } else {
            warn!(job_id = %job.job_id, attempts = outcome.attempts, error = ?job.webhook_last_error, "webhook delivery exhausted");
            self.metrics.webhook_failed();
        }

        Ok(())
    }
}
