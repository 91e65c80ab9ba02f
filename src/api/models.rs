//! Request/response bodies for the HTTP ingress (spec §6.1).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::scheduler::{AdmissionDecision, AdmissionResult};
use crate::webhook::WebhookDocument;

/// `GET /processes/{processNumber}` query parameters (spec §6.1:
/// `?autoDownload={bool}&webhookUrl={url?}`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmitProcessQuery {
    #[serde(default, rename = "webhookUrl")]
    pub webhook_url: Option<String>,
    #[serde(default, rename = "autoDownload")]
    pub auto_download: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionOutcome {
    ReusedActive,
    ReusedComplete,
    Admitted,
}

impl From<AdmissionDecision> for AdmissionOutcome {
    fn from(value: AdmissionDecision) -> Self {
        match value {
            AdmissionDecision::ReusedActive => AdmissionOutcome::ReusedActive,
            AdmissionDecision::ReusedComplete => AdmissionOutcome::ReusedComplete,
            AdmissionDecision::Admitted => AdmissionOutcome::Admitted,
        }
    }
}

/// `GET /processes/{processNumber}` response body.
#[derive(Debug, Clone, Serialize)]
pub struct AdmitProcessResponse {
    pub process_number: String,
    pub job_id: String,
    pub outcome: AdmissionOutcome,
    pub total_documents: usize,
    pub documents: Vec<WebhookDocument>,
}

impl AdmitProcessResponse {
    pub fn from_admission(result: AdmissionResult) -> Self {
        let documents: Vec<WebhookDocument> = result
            .documents
            .iter()
            .map(|projected| WebhookDocument::from_document(&projected.document, projected.download_url.clone()))
            .collect();

        Self {
            process_number: result.process.process_number,
            job_id: result.job_id,
            outcome: result.decision.into(),
            total_documents: documents.len(),
            documents,
        }
    }
}

/// `POST /webhooks/validate` request/response (spec §6.1).
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateWebhookRequest {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateWebhookResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// `POST /webhooks/test-connectivity` request/response.
#[derive(Debug, Clone, Deserialize)]
pub struct TestConnectivityRequest {
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestConnectivityResponse {
    pub reachable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}
