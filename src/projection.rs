//! The spec's Status Projection (§4.5): given a `processNumber`, composes
//! `ProcessStatus` from the Metadata Store. Performs no writes and no
//! upstream calls; the only I/O is Blob Store pre-signing for AVAILABLE
//! documents.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{Document, DocumentStatus, JobStatus};
use crate::ledger::{FjallStore, LedgerError};
use crate::storage::StorageClient;
use crate::webhook::WebhookDocument;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("process not found: {0}")]
    ProcessNotFound(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The body returned by `GET /processes/{processNumber}/status` (spec
/// §6.3).
#[derive(Debug, Clone, Serialize)]
pub struct ProcessStatus {
    pub process_number: String,
    pub overall_status: OverallStatus,
    pub progress_percentage: u8,
    pub total_documents: usize,
    pub pending_documents: usize,
    pub processing_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub documents: Vec<WebhookDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub webhook_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

pub struct StatusProjection {
    store: Arc<FjallStore>,
    storage: Arc<StorageClient>,
    presigned_url_ttl: Duration,
}

impl StatusProjection {
    pub fn new(store: Arc<FjallStore>, storage: Arc<StorageClient>, presigned_url_ttl: Duration) -> Self {
        Self { store, storage, presigned_url_ttl }
    }

    /// Composes `ProcessStatus` for `process_number` (spec §4.5/§6.3).
    pub async fn project(&self, process_number: &str) -> Result<ProcessStatus, ProjectionError> {
        let process = self
            .store
            .get_process(process_number)?
            .ok_or_else(|| ProjectionError::ProcessNotFound(process_number.to_string()))?;
        let _ = process;

        let documents = self.store.list_documents(process_number)?;
        let total = documents.len();
        let pending = documents.iter().filter(|d| d.status == DocumentStatus::Pending).count();
        let processing = documents.iter().filter(|d| d.status == DocumentStatus::Processing).count();
        let completed = documents.iter().filter(|d| d.status == DocumentStatus::Available).count();
        let failed = documents.iter().filter(|d| d.status == DocumentStatus::Failed).count();

        let last_job_id = self.store.get_last_job_id(process_number)?;
        let last_job = match &last_job_id {
            Some(id) => self.store.get_job(id)?,
            None => None,
        };

        let overall_status = self.derive_overall_status(total, completed, failed, processing, &last_job);
        let progress_percentage = if total == 0 { 0 } else { (100 * (completed + failed) / total).min(100) as u8 };

        let mut webhook_documents = Vec::with_capacity(documents.len());
        for document in &documents {
            let download_url = self.presign_if_available(document).await?;
            webhook_documents.push(WebhookDocument::from_document(document, download_url));
        }

        Ok(ProcessStatus {
            process_number: process_number.to_string(),
            overall_status,
            progress_percentage,
            total_documents: total,
            pending_documents: pending,
            processing_documents: processing,
            completed_documents: completed,
            failed_documents: failed,
            documents: webhook_documents,
            job_id: last_job_id,
            webhook_url: last_job.as_ref().and_then(|j| j.webhook_url.clone()),
            webhook_sent: last_job.as_ref().map(|j| j.webhook_sent).unwrap_or(false),
            started_at: last_job.as_ref().and_then(|j| j.started_at),
            completed_at: last_job.as_ref().and_then(|j| j.completed_at),
        })
    }

    async fn presign_if_available(&self, document: &Document) -> Result<Option<String>, ProjectionError> {
        match (&document.status, &document.blob_key) {
            (DocumentStatus::Available, Some(key)) => {
                Ok(Some(self.storage.presign_read(key, self.presigned_url_ttl).await?))
            }
            _ => Ok(None),
        }
    }

    /// Spec §4.5 derivation rules, applied in priority order.
    fn derive_overall_status(
        &self,
        total: usize,
        completed: usize,
        failed: usize,
        processing: usize,
        last_job: &Option<crate::domain::Job>,
    ) -> OverallStatus {
        if total > 0 && completed == total {
            return OverallStatus::Completed;
        }
        if total > 0 && failed == total {
            return OverallStatus::Failed;
        }
        let job_processing = last_job.as_ref().map(|j| j.status == JobStatus::Processing).unwrap_or(false);
        if processing > 0 || job_processing {
            return OverallStatus::Processing;
        }
        OverallStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Document, Job, Process};
    use tempfile::TempDir;

    fn store() -> (Arc<FjallStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FjallStore::open(temp_dir.path().join("ledger")).unwrap());
        (store, temp_dir)
    }

    fn projection_for(store: Arc<FjallStore>) -> StatusProjection {
        StatusProjection::new(store, Arc::new(StorageClient::in_memory()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn reports_completed_when_all_documents_available() {
        let (store, _tmp) = store();
        store.upsert_process(&Process::new("P1".into(), serde_json::json!({}), true)).unwrap();
        let mut doc = Document::new_pending("P1", "d1", "a.pdf", "h1", true);
        doc.status = DocumentStatus::Available;
        doc.blob_key = Some("k1".into());
        doc.size = Some(5);
        store.upsert_document(&doc).unwrap();

        let status = projection_for(store).project("P1").await.unwrap();
        assert_eq!(status.overall_status, OverallStatus::Completed);
        assert_eq!(status.progress_percentage, 100);
        assert!(status.documents[0].download_url.is_some());
    }

    #[tokio::test]
    async fn reports_failed_when_all_documents_failed() {
        let (store, _tmp) = store();
        store.upsert_process(&Process::new("P2".into(), serde_json::json!({}), true)).unwrap();
        let mut doc = Document::new_pending("P2", "d1", "a.pdf", "h1", true);
        doc.status = DocumentStatus::Failed;
        doc.error_message = Some("boom".into());
        store.upsert_document(&doc).unwrap();

        let status = projection_for(store).project("P2").await.unwrap();
        assert_eq!(status.overall_status, OverallStatus::Failed);
    }

    #[tokio::test]
    async fn reports_processing_while_a_job_is_in_flight() {
        let (store, _tmp) = store();
        store.upsert_process(&Process::new("P3".into(), serde_json::json!({}), true)).unwrap();
        let doc = Document::new_pending("P3", "d1", "a.pdf", "h1", true);
        store.upsert_document(&doc).unwrap();
        let job = Job::new("job1".into(), "P3".into(), None);
        store.admit_job(&job).unwrap();

        let status = projection_for(store).project("P3").await.unwrap();
        assert_eq!(status.overall_status, OverallStatus::Processing);
        assert_eq!(status.job_id, Some("job1".to_string()));
    }

    #[tokio::test]
    async fn unknown_process_is_an_error() {
        let (store, _tmp) = store();
        let err = projection_for(store).project("missing").await.unwrap_err();
        assert!(matches!(err, ProjectionError::ProcessNotFound(_)));
    }
}
