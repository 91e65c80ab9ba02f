//! The spec's Upstream Client (§2 item 3): given a document handle, returns
//! bytes plus metadata; may fail transiently (timeout, 5xx) or permanently
//! (other 4xx). Retry policy lives entirely in the Worker (§9 design note:
//! "centralize retry policy in two places only"), so this client never
//! retries on its own.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::UpstreamConfig;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("transient upstream error: {0}")]
    Transient(String),

    #[error("permanent upstream error: {0}")]
    Permanent(String),
}

impl UpstreamError {
    pub fn is_transient(&self) -> bool {
        matches!(self, UpstreamError::Transient(_))
    }
}

/// Bytes plus the metadata the Worker needs to upload and record a document.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// One entry in a process's upstream document listing.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamDocumentListing {
    pub document_id: String,
    pub name: String,
    pub source_handle: String,
}

/// Metadata fetched for a process not yet known to the Metadata Store.
#[derive(Debug, Clone)]
pub struct UpstreamProcessMetadata {
    pub summary: serde_json::Value,
    pub documents: Vec<UpstreamDocumentListing>,
}

/// Seam the Scheduler and Worker depend on (spec §9: "pass explicit
/// dependencies... into Scheduler and Worker constructors"). Object-safe so
/// it can be held as `Arc<dyn UpstreamClient>` and swapped for a fake in
/// tests.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Fetches process metadata and its document listing, used when the
    /// Scheduler admits a process it has not seen before (spec §4.1 step 3).
    async fn fetch_process(&self, process_number: &str) -> Result<UpstreamProcessMetadata, UpstreamError>;

    /// Fetches one document's bytes via its opaque `source_handle` (spec
    /// §4.2 step 5c).
    async fn fetch_document(&self, source_handle: &str) -> Result<FetchedDocument, UpstreamError>;
}

/// Production implementation backed by `reqwest`.
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpUpstreamClient {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| UpstreamError::Permanent(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost".to_string()),
            api_key: config.api_key.clone(),
        })
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn classify(status: reqwest::StatusCode, body_hint: &str) -> UpstreamError {
        if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            UpstreamError::Transient(format!("status {status}: {body_hint}"))
        } else {
            UpstreamError::Permanent(format!("status {status}: {body_hint}"))
        }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch_process(&self, process_number: &str) -> Result<UpstreamProcessMetadata, UpstreamError> {
        let url = format!("{}/processes/{}", self.base_url, process_number);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }

        #[derive(Deserialize)]
        struct Payload {
            #[serde(flatten)]
            summary: serde_json::Value,
            #[serde(default)]
            documents: Vec<UpstreamDocumentListing>,
        }

        let payload: Payload = response
            .json()
            .await
            .map_err(|e| UpstreamError::Permanent(e.to_string()))?;

        Ok(UpstreamProcessMetadata {
            summary: payload.summary,
            documents: payload.documents,
        })
    }

    async fn fetch_document(&self, source_handle: &str) -> Result<FetchedDocument, UpstreamError> {
        let response = self
            .authorize(self.client.get(source_handle))
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transient(e.to_string()))?
            .to_vec();

        Ok(FetchedDocument { bytes, mime_type })
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() || err.is_connect() {
        UpstreamError::Transient(err.to_string())
    } else {
        UpstreamError::Permanent(err.to_string())
    }
}

/// Deterministic fake for tests (spec §10.5: "hand-rolled fake/mock
/// implementations... no network access in tests"). Not `cfg(test)`-gated
/// so integration tests under `tests/` can depend on it too.
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub enum FetchOutcome {
        Success(FetchedDocument),
        Transient,
        Permanent,
    }

    /// Scripted upstream: each `source_handle` maps to a fixed sequence of
    /// outcomes consumed in order across retries, so tests can assert exact
    /// retry counts (spec §8's "retry monotonicity" property).
    #[derive(Default)]
    pub struct FakeUpstreamClient {
        pub process_metadata: Mutex<HashMap<String, UpstreamProcessMetadata>>,
        outcomes: Mutex<HashMap<String, Vec<FetchOutcome>>>,
        call_counts: Mutex<HashMap<String, usize>>,
        total_calls: AtomicUsize,
    }

    impl FakeUpstreamClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_process(self, process_number: &str, metadata: UpstreamProcessMetadata) -> Self {
            self.process_metadata
                .lock()
                .unwrap()
                .insert(process_number.to_string(), metadata);
            self
        }

        pub fn script(self, source_handle: &str, outcomes: Vec<FetchOutcome>) -> Self {
            self.outcomes
                .lock()
                .unwrap()
                .insert(source_handle.to_string(), outcomes);
            self
        }

        pub fn always_succeeds(self, source_handle: &str, bytes: Vec<u8>) -> Self {
            self.script(
                source_handle,
                vec![FetchOutcome::Success(FetchedDocument { bytes, mime_type: Some("application/pdf".into()) })],
            )
        }

        pub fn call_count(&self, source_handle: &str) -> usize {
            *self.call_counts.lock().unwrap().get(source_handle).unwrap_or(&0)
        }

        pub fn total_calls(&self) -> usize {
            self.total_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl UpstreamClient for FakeUpstreamClient {
        async fn fetch_process(&self, process_number: &str) -> Result<UpstreamProcessMetadata, UpstreamError> {
            self.process_metadata
                .lock()
                .unwrap()
                .get(process_number)
                .cloned()
                .ok_or_else(|| UpstreamError::Permanent(format!("no fixture for process {process_number}")))
        }

        async fn fetch_document(&self, source_handle: &str) -> Result<FetchedDocument, UpstreamError> {
            self.total_calls.fetch_add(1, Ordering::SeqCst);
            let mut counts = self.call_counts.lock().unwrap();
            let idx = counts.entry(source_handle.to_string()).or_insert(0);
            let current = *idx;
            *idx += 1;
            drop(counts);

            let mut outcomes = self.outcomes.lock().unwrap();
            let script = outcomes
                .get_mut(source_handle)
                .ok_or_else(|| UpstreamError::Permanent(format!("no script for handle {source_handle}")))?;

            let outcome = script.get(current.min(script.len().saturating_sub(1)))
                .ok_or_else(|| UpstreamError::Permanent("script exhausted".into()))?;

            match outcome {
                FetchOutcome::Success(doc) => Ok(doc.clone()),
                FetchOutcome::Transient => Err(UpstreamError::Transient("simulated transient failure".into())),
                FetchOutcome::Permanent => Err(UpstreamError::Permanent("simulated permanent failure".into())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::*;
    use super::*;

    #[tokio::test]
    async fn fake_client_replays_scripted_outcomes_in_order() {
        let fake = FakeUpstreamClient::new().script(
            "h1",
            vec![
                FetchOutcome::Transient,
                FetchOutcome::Transient,
                FetchOutcome::Success(FetchedDocument { bytes: b"ok".to_vec(), mime_type: None }),
            ],
        );

        assert!(fake.fetch_document("h1").await.is_err());
        assert!(fake.fetch_document("h1").await.is_err());
        let ok = fake.fetch_document("h1").await.unwrap();
        assert_eq!(ok.bytes, b"ok");
        assert_eq!(fake.call_count("h1"), 3);
    }

    #[tokio::test]
    async fn fake_client_returns_metadata_by_process_number() {
        let fake = FakeUpstreamClient::new().with_process(
            "P1",
            UpstreamProcessMetadata {
                summary: serde_json::json!({"court": "TJSP"}),
                documents: vec![UpstreamDocumentListing {
                    document_id: "d1".into(),
                    name: "petition.pdf".into(),
                    source_handle: "https://upstream/d1".into(),
                }],
            },
        );

        let meta = fake.fetch_process("P1").await.unwrap();
        assert_eq!(meta.documents.len(), 1);
    }

    #[test]
    fn transient_errors_are_retryable_permanent_are_not() {
        assert!(UpstreamError::Transient("x".into()).is_transient());
        assert!(!UpstreamError::Permanent("x".into()).is_transient());
    }
}
