//! Core data model: processes, documents, and jobs.
//!
//! Mirrors the entity definitions maintained by the Metadata Store. These
//! types are shared between the ingress layer, the scheduler, the worker,
//! and the status projection so state transitions are always expressed
//! against one shape.

use serde::{Deserialize, Serialize};

/// A court process tracked by the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub process_number: String,
    pub court: Option<String>,
    pub subject: Option<String>,
    /// Opaque upstream metadata, stored as-is.
    pub summary: serde_json::Value,
    pub has_documents: bool,
}

impl Process {
    pub fn new(process_number: String, summary: serde_json::Value, has_documents: bool) -> Self {
        Self {
            process_number,
            court: summary.get("court").and_then(|v| v.as_str()).map(str::to_owned),
            subject: summary.get("subject").and_then(|v| v.as_str()).map(str::to_owned),
            summary,
            has_documents,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Available,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub process_ref: String,
    pub document_id: String,
    pub name: String,
    pub mime_type: Option<String>,
    pub size: Option<u64>,
    /// Opaque handle the Upstream Client uses to fetch this document's bytes.
    pub source_handle: String,
    pub blob_key: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub download_started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub download_completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Document {
    pub fn new_pending(
        process_ref: &str,
        document_id: &str,
        name: &str,
        source_handle: &str,
        start_processing: bool,
    ) -> Self {
        Self {
            process_ref: process_ref.to_string(),
            document_id: document_id.to_string(),
            name: name.to_string(),
            mime_type: None,
            size: None,
            source_handle: source_handle.to_string(),
            blob_key: None,
            status: if start_processing {
                DocumentStatus::Processing
            } else {
                DocumentStatus::Pending
            },
            error_message: None,
            download_started_at: None,
            download_completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, DocumentStatus::Available | DocumentStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub process_ref: String,
    pub webhook_url: Option<String>,
    pub status: JobStatus,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    pub progress_percentage: u8,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub webhook_sent: bool,
    pub webhook_sent_at: Option<chrono::DateTime<chrono::Utc>>,
    pub webhook_attempts: u32,
    pub webhook_last_error: Option<String>,
    pub error_message: Option<String>,
}

impl Job {
    pub fn new(job_id: String, process_ref: String, webhook_url: Option<String>) -> Self {
        Self {
            job_id,
            process_ref,
            webhook_url,
            status: JobStatus::Pending,
            total_documents: 0,
            completed_documents: 0,
            failed_documents: 0,
            progress_percentage: 0,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            webhook_sent: false,
            webhook_sent_at: None,
            webhook_attempts: 0,
            webhook_last_error: None,
            error_message: None,
        }
    }

    /// Recomputes `progress_percentage` from the current counters (I2).
    pub fn recompute_progress(&mut self) {
        let done = self.completed_documents + self.failed_documents;
        let pct = if self.total_documents == 0 {
            0
        } else {
            (100 * done / self.total_documents).min(100)
        };
        self.progress_percentage = pct as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percentage_tracks_counters() {
        let mut job = Job::new("job1".into(), "proc1".into(), None);
        job.total_documents = 4;
        job.completed_documents = 1;
        job.failed_documents = 1;
        job.recompute_progress();
        assert_eq!(job.progress_percentage, 50);
    }

    #[test]
    fn progress_percentage_with_zero_documents_is_zero() {
        let mut job = Job::new("job1".into(), "proc1".into(), None);
        job.recompute_progress();
        assert_eq!(job.progress_percentage, 0);
    }

    #[test]
    fn new_document_starts_pending_without_webhook() {
        let doc = Document::new_pending("p1", "d1", "file.pdf", "handle1", false);
        assert_eq!(doc.status, DocumentStatus::Pending);
    }

    #[test]
    fn new_document_starts_processing_with_webhook() {
        let doc = Document::new_pending("p1", "d1", "file.pdf", "handle1", true);
        assert_eq!(doc.status, DocumentStatus::Processing);
    }
}
