//! Status Manager: pure transition tables for documents and jobs, plus the
//! webhook URL policy. Stateless — every function here takes its inputs by
//! value/reference and returns a decision, never touching the ledger.

use thiserror::Error;
use url::Url;

use crate::domain::{DocumentStatus, JobStatus};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid document transition: {from:?} -> {to:?}")]
    InvalidDocumentTransition { from: DocumentStatus, to: DocumentStatus },
    #[error("invalid job transition: {from:?} -> {to:?}")]
    InvalidJobTransition { from: JobStatus, to: JobStatus },
}

/// Checks whether `from -> to` is a legal document transition (spec §4.3).
pub fn document_transition_allowed(from: DocumentStatus, to: DocumentStatus) -> bool {
    use DocumentStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Failed)
            | (Processing, Available)
            | (Processing, Failed)
            | (Failed, Processing)
    )
}

/// Validates and would-be-perform a document transition; callers apply the
/// mutation themselves once this returns `Ok`.
pub fn check_document_transition(
    from: DocumentStatus,
    to: DocumentStatus,
) -> Result<(), TransitionError> {
    if document_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidDocumentTransition { from, to })
    }
}

/// Checks whether `from -> to` is a legal job transition (spec §4.3).
pub fn job_transition_allowed(from: JobStatus, to: JobStatus) -> bool {
    use JobStatus::*;
    matches!(
        (from, to),
        (Pending, Processing)
            | (Pending, Failed)
            | (Pending, Cancelled)
            | (Processing, Completed)
            | (Processing, Failed)
            | (Processing, Cancelled)
            | (Failed, Processing)
            | (Cancelled, Processing)
    )
}

pub fn check_job_transition(from: JobStatus, to: JobStatus) -> Result<(), TransitionError> {
    if job_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(TransitionError::InvalidJobTransition { from, to })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookUrlError {
    #[error("webhook url does not parse: {0}")]
    Unparseable(String),
    #[error("webhook url scheme must be http or https, got '{0}'")]
    UnsupportedScheme(String),
    #[error("http webhook urls are only allowed against localhost/127.0.0.1 in production")]
    HttpNotAllowedOffLoopback,
    #[error("webhook url uses a forbidden port: {0}")]
    ForbiddenPort(u16),
    #[error("webhook url has no authority")]
    MissingAuthority,
}

const FORBIDDEN_PORTS: [u16; 3] = [22, 23, 3389];

/// Validates a caller-supplied webhook URL against the policy in spec §4.3.
///
/// `production` gates the http-only-for-loopback rule; it defaults to
/// `true` in configuration (see `config::WebhookConfig`), so the stricter
/// policy is the safe default.
pub fn validate_webhook_url(raw: &str, production: bool) -> Result<(), WebhookUrlError> {
    let url = Url::parse(raw).map_err(|e| WebhookUrlError::Unparseable(e.to_string()))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if production {
                let host_is_loopback = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
                if !host_is_loopback {
                    return Err(WebhookUrlError::HttpNotAllowedOffLoopback);
                }
            }
        }
        other => return Err(WebhookUrlError::UnsupportedScheme(other.to_string())),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(WebhookUrlError::MissingAuthority);
    }

    if let Some(port) = url.port() {
        if FORBIDDEN_PORTS.contains(&port) {
            return Err(WebhookUrlError::ForbiddenPort(port));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use DocumentStatus::*;
    use JobStatus::*;

    #[test]
    fn document_available_is_terminal() {
        assert!(!document_transition_allowed(Available, Processing));
        assert!(!document_transition_allowed(Available, Failed));
    }

    #[test]
    fn document_failed_can_retry_to_processing() {
        assert!(document_transition_allowed(Failed, Processing));
        assert!(!document_transition_allowed(Failed, Available));
    }

    #[test]
    fn job_completed_is_terminal() {
        assert!(!job_transition_allowed(Completed, Processing));
        assert!(!job_transition_allowed(Completed, Failed));
    }

    #[test]
    fn job_cancelled_can_be_reopened_to_processing_only() {
        assert!(job_transition_allowed(Cancelled, Processing));
        assert!(!job_transition_allowed(Cancelled, Completed));
    }

    #[test]
    fn webhook_https_always_allowed() {
        assert!(validate_webhook_url("https://example.test/cb", true).is_ok());
    }

    #[test]
    fn webhook_http_rejected_in_production_off_loopback() {
        let err = validate_webhook_url("http://example.test/cb", true).unwrap_err();
        assert_eq!(err, WebhookUrlError::HttpNotAllowedOffLoopback);
    }

    #[test]
    fn webhook_http_allowed_on_loopback_in_production() {
        assert!(validate_webhook_url("http://127.0.0.1:9000/cb", true).is_ok());
        assert!(validate_webhook_url("http://localhost/cb", true).is_ok());
    }

    #[test]
    fn webhook_http_allowed_off_loopback_outside_production() {
        assert!(validate_webhook_url("http://example.test/cb", false).is_ok());
    }

    #[test]
    fn webhook_rejects_forbidden_ports() {
        let err = validate_webhook_url("https://example.test:22/cb", true).unwrap_err();
        assert_eq!(err, WebhookUrlError::ForbiddenPort(22));
    }

    #[test]
    fn webhook_rejects_non_http_scheme() {
        let err = validate_webhook_url("ftp://example.test/cb", true).unwrap_err();
        assert_eq!(err, WebhookUrlError::UnsupportedScheme("ftp".to_string()));
    }
}
