use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("worker.batch_size must be greater than zero")]
    InvalidBatchSize,

    #[error("worker.max_retries must be greater than zero")]
    InvalidMaxRetries,

    #[error("webhook.max_attempts must be greater than zero")]
    InvalidWebhookMaxAttempts,

    #[error("storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },

    #[error("worker.pool_size must be greater than zero")]
    InvalidPoolSize,
}

/// Validate the entire configuration.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_worker(config)?;
    validate_webhook(config)?;
    validate_storage(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    if config.worker.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize);
    }
    if config.worker.max_retries == 0 {
        return Err(ValidationError::InvalidMaxRetries);
    }
    if config.worker.pool_size == 0 {
        return Err(ValidationError::InvalidPoolSize);
    }
    Ok(())
}

fn validate_webhook(config: &Config) -> Result<(), ValidationError> {
    if config.webhook.max_attempts == 0 {
        return Err(ValidationError::InvalidWebhookMaxAttempts);
    }
    Ok(())
}

fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.job_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "job_ttl_days".to_string(),
            value: 0,
        });
    }
    Ok(())
}
