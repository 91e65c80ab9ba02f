//! Request handlers for the HTTP ingress (spec §6.1).

use axum::{Json, extract::Path, extract::Query, extract::State, response::IntoResponse};

use super::error::ApiError;
use super::models::{
    AdmitProcessQuery, AdmitProcessResponse, HealthResponse, TestConnectivityRequest,
    TestConnectivityResponse, ValidateWebhookRequest, ValidateWebhookResponse,
};
use super::state::AppState;
use crate::status;

/// `GET /processes/{processNumber}`: runs the Job Scheduler's admission
/// decision (spec §4.1, §6.1).
pub async fn admit_process(
    State(state): State<AppState>,
    Path(process_number): Path<String>,
    Query(query): Query<AdmitProcessQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .scheduler
        .admit(&process_number, query.webhook_url, query.auto_download)
        .await?;

    Ok((axum::http::StatusCode::OK, Json(AdmitProcessResponse::from_admission(result))))
}

/// `GET /processes/{processNumber}/status`: composes the Status Projection
/// (spec §4.5, §6.3).
pub async fn get_process_status(
    State(state): State<AppState>,
    Path(process_number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let status = state.projection.project(&process_number).await?;
    Ok((axum::http::StatusCode::OK, Json(status)))
}

/// `POST /webhooks/validate`: runs the Status Manager's webhook URL policy
/// without admitting anything (spec §6.1).
pub async fn validate_webhook(
    State(state): State<AppState>,
    Json(request): Json<ValidateWebhookRequest>,
) -> impl IntoResponse {
    let response = match status::validate_webhook_url(&request.webhook_url, state.production) {
        Ok(()) => ValidateWebhookResponse { valid: true, reason: None },
        Err(e) => ValidateWebhookResponse { valid: false, reason: Some(e.to_string()) },
    };
    (axum::http::StatusCode::OK, Json(response))
}

/// `POST /webhooks/test-connectivity`: asks the Webhook Dispatcher to probe
/// a URL without delivering a real payload (spec §6.1).
pub async fn test_connectivity(
    State(state): State<AppState>,
    Json(request): Json<TestConnectivityRequest>,
) -> impl IntoResponse {
    let reachable = state.webhook.check_connectivity(&request.webhook_url).await;
    (axum::http::StatusCode::OK, Json(TestConnectivityResponse { reachable }))
}

/// `GET /health`: reports on the Metadata Store and the Worker pool's
/// broker channels.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();

    let ledger_healthy = state.store.stats().is_ok();
    components.insert("ledger".to_string(), status_label(ledger_healthy));

    let broker_healthy = state.broker.health_check();
    components.insert("broker".to_string(), status_label(broker_healthy));

    let all_healthy = ledger_healthy && broker_healthy;
    let overall_status = status_label(all_healthy);

    let status_code = if all_healthy {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: overall_status.clone(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

fn status_label(healthy: bool) -> String {
    if healthy { "healthy".to_string() } else { "unhealthy".to_string() }
}
