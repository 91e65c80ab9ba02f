//! The spec's Webhook Dispatcher (§4.4): delivers one notification to a
//! caller-supplied URL with bounded retry and strict success discipline.
//! Never affects Job terminal status (§7: "WebhookDelivery... never affects
//! Job terminal status; recorded on Job").

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::WebhookConfig;
use crate::domain::{Document, DocumentStatus, Job};

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("request build error: {0}")]
    Build(String),
}

/// One document entry inside the webhook payload (spec §6.2).
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDocument {
    pub id: String,
    pub uuid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl WebhookDocument {
    pub fn from_document(document: &Document, download_url: Option<String>) -> Self {
        let status = match document.status {
            DocumentStatus::Available => "available",
            DocumentStatus::Failed => "failed",
            // The dispatcher only ever fires once the Job is terminal, at
            // which point every document is AVAILABLE or FAILED; any other
            // status reaching here indicates a Worker bug, not a valid state.
            _ => "failed",
        };

        Self {
            id: document.document_id.clone(),
            uuid: document.document_id.clone(),
            name: document.name.clone(),
            mime_type: document.mime_type.clone(),
            size: document.size,
            status: status.to_string(),
            download_url,
            error_message: document.error_message.clone(),
        }
    }
}

/// The body POSTed to `webhookUrl` (spec §6.2).
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub process_number: String,
    pub job_id: String,
    pub status: String,
    pub total_documents: usize,
    pub completed_documents: usize,
    pub failed_documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<Utc>>,
    pub documents: Vec<WebhookDocument>,
}

impl WebhookPayload {
    pub fn from_job(job: &Job, documents: Vec<WebhookDocument>) -> Self {
        Self {
            process_number: job.process_ref.clone(),
            job_id: job.job_id.clone(),
            status: match job.status {
                crate::domain::JobStatus::Completed => "completed".to_string(),
                _ => "failed".to_string(),
            },
            total_documents: job.total_documents,
            completed_documents: job.completed_documents,
            failed_documents: job.failed_documents,
            completed_at: job.completed_at,
            documents,
        }
    }
}

/// Outcome of a delivery attempt sequence, recorded onto the Job.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub attempts: u32,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    pub sent_at: Option<chrono::DateTime<Utc>>,
}

/// Seam the Worker depends on (spec §9). Object-safe so it can be held as
/// `Arc<dyn WebhookDispatcher>` and swapped for a fake in tests.
#[async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn deliver(&self, url: &str, payload: &WebhookPayload, job_id: &str) -> DeliveryOutcome;

    /// Used by `POST /webhooks/test-connectivity` (spec §6.1).
    async fn check_connectivity(&self, url: &str) -> bool;
}

pub struct HttpWebhookDispatcher {
    client: reqwest::Client,
    max_attempts: u32,
    backoff_base_ms: u64,
}

impl HttpWebhookDispatcher {
    pub fn from_config(config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("reqwest client configuration is static and known-valid");

        Self {
            client,
            max_attempts: config.max_attempts,
            backoff_base_ms: config.retry_backoff_base_ms,
        }
    }

    /// Backoff before attempt n (n>=2): `base * 2^(n-2)`, yielding 0, 2s, 4s
    /// before attempts 1, 2, 3 (spec §4.4).
    fn backoff_for_attempt(&self, attempt: u32) -> std::time::Duration {
        if attempt < 2 {
            std::time::Duration::ZERO
        } else {
            std::time::Duration::from_millis(self.backoff_base_ms * 2u64.pow(attempt - 2))
        }
    }
}

#[async_trait]
impl WebhookDispatcher for HttpWebhookDispatcher {
    async fn deliver(&self, url: &str, payload: &WebhookPayload, job_id: &str) -> DeliveryOutcome {
        let mut last_status_code = None;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            if attempt >= 2 {
                tokio::time::sleep(self.backoff_for_attempt(attempt)).await;
            }

            let result = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header("X-Job-Id", job_id)
                .header("X-Timestamp", Utc::now().to_rfc3339())
                .header("X-Attempt", attempt.to_string())
                .json(payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    last_status_code = Some(status.as_u16());
                    if status.is_success() {
                        info!(job_id, attempt, status = status.as_u16(), "webhook delivered");
                        return DeliveryOutcome {
                            success: true,
                            attempts: attempt,
                            last_status_code,
                            last_error: None,
                            sent_at: Some(Utc::now()),
                        };
                    }
                    last_error = Some(format!("http status {status}"));
                    warn!(job_id, attempt, status = status.as_u16(), "webhook attempt failed");
                }
                Err(e) => {
                    last_error = Some(classify(&e));
                    warn!(job_id, attempt, error = %e, "webhook attempt errored");
                }
            }
        }

        DeliveryOutcome {
            success: false,
            attempts: self.max_attempts,
            last_status_code,
            last_error,
            sent_at: None,
        }
    }

    async fn check_connectivity(&self, url: &str) -> bool {
        self.client
            .head(url)
            .send()
            .await
            .map(|r| r.status().is_success() || r.status().as_u16() == 405)
            .unwrap_or(false)
    }
}

fn classify(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("timeout: {err}")
    } else if err.is_connect() {
        format!("connect_error: {err}")
    } else {
        format!("other: {err}")
    }
}

/// Not `cfg(test)`-gated so integration tests under `tests/` can depend on
/// it too.
pub mod fake {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted webhook transport for tests: always returns the configured
    /// outcome, counting deliveries for assertions like Scenario E (retry
    /// exhaustion).
    pub struct FakeWebhookDispatcher {
        pub succeeds: bool,
        pub status_code: u16,
        attempts_made: AtomicU32,
        pub last_payload: Mutex<Option<WebhookPayload>>,
    }

    impl FakeWebhookDispatcher {
        pub fn always_succeeds() -> Self {
            Self { succeeds: true, status_code: 200, attempts_made: AtomicU32::new(0), last_payload: Mutex::new(None) }
        }

        pub fn always_fails(status_code: u16) -> Self {
            Self { succeeds: false, status_code, attempts_made: AtomicU32::new(0), last_payload: Mutex::new(None) }
        }

        pub fn attempts_made(&self) -> u32 {
            self.attempts_made.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WebhookDispatcher for FakeWebhookDispatcher {
        async fn deliver(&self, _url: &str, payload: &WebhookPayload, _job_id: &str) -> DeliveryOutcome {
            *self.last_payload.lock().unwrap() = Some(payload.clone());
            const SIMULATED_MAX_ATTEMPTS: u32 = 3;
            let attempts = if self.succeeds { 1 } else { SIMULATED_MAX_ATTEMPTS };
            self.attempts_made.fetch_add(attempts, Ordering::SeqCst);

            DeliveryOutcome {
                success: self.succeeds,
                attempts,
                last_status_code: Some(self.status_code),
                last_error: if self.succeeds { None } else { Some(format!("http status {}", self.status_code)) },
                sent_at: if self.succeeds { Some(Utc::now()) } else { None },
            }
        }

        async fn check_connectivity(&self, _url: &str) -> bool {
            self.succeeds
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobStatus;

    fn sample_job() -> Job {
        let mut job = Job::new("job1".into(), "P1".into(), Some("https://example.test/cb".into()));
        job.status = JobStatus::Completed;
        job.total_documents = 1;
        job.completed_documents = 1;
        job
    }

    #[test]
    fn payload_reports_completed_status_from_job() {
        let job = sample_job();
        let payload = WebhookPayload::from_job(&job, vec![]);
        assert_eq!(payload.status, "completed");
        assert_eq!(payload.job_id, "job1");
    }

    #[test]
    fn webhook_document_omits_download_url_when_none() {
        let doc = Document::new_pending("P1", "d1", "a.pdf", "h1", true);
        let wd = WebhookDocument::from_document(&doc, None);
        let json = serde_json::to_string(&wd).unwrap();
        assert!(!json.contains("download_url"));
    }

    #[tokio::test]
    async fn fake_dispatcher_records_payload_and_reports_failure_after_exhaustion() {
        let dispatcher = fake::FakeWebhookDispatcher::always_fails(503);
        let job = sample_job();
        let payload = WebhookPayload::from_job(&job, vec![]);

        let outcome = dispatcher.deliver("https://example.test/cb", &payload, "job1").await;
        assert!(!outcome.success);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.last_status_code, Some(503));
    }

    #[test]
    fn backoff_schedule_matches_spec() {
        let dispatcher = HttpWebhookDispatcher::from_config(&WebhookConfig {
            max_attempts: 3,
            retry_backoff_base_ms: 2000,
            timeout_secs: 30,
            production: true,
        });
        assert_eq!(dispatcher.backoff_for_attempt(1), std::time::Duration::ZERO);
        assert_eq!(dispatcher.backoff_for_attempt(2), std::time::Duration::from_secs(2));
        assert_eq!(dispatcher.backoff_for_attempt(3), std::time::Duration::from_secs(4));
    }
}
