use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fjall_path: default_fjall_path(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/ledger")
}

/// Storage provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    Local,
}

impl Default for StorageProvider {
    fn default() -> Self {
        StorageProvider::Local
    }
}

/// Blob Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub endpoint: Option<String>,
    /// Loaded from environment, never from the TOML file.
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
    pub region: Option<String>,
    #[serde(default = "default_presigned_url_ttl_secs")]
    pub presigned_url_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: default_bucket(),
            endpoint: None,
            access_key: None,
            secret_key: None,
            region: None,
            presigned_url_ttl_secs: default_presigned_url_ttl_secs(),
        }
    }
}

fn default_bucket() -> String {
    "processvault-documents".to_string()
}

fn default_presigned_url_ttl_secs() -> u64 {
    3600
}

impl StorageConfig {
    pub fn presigned_url_ttl(&self) -> Duration {
        Duration::from_secs(self.presigned_url_ttl_secs)
    }
}

/// Job Scheduler tunables (spec §4.1).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Default for `autoDownload` when the caller omits it.
    #[serde(default = "default_true")]
    pub auto_download_default: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            auto_download_default: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Document Worker tunables (spec §4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker pool loops consuming broker tickets.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Documents processed in parallel within one job (B).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-document retry attempts (R).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base for the exponential backoff between document retries.
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// How often a running job polls for cancellation, in batches.
    #[serde(default = "default_broker_channel_size")]
    pub broker_channel_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            broker_channel_size: default_broker_channel_size(),
        }
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_batch_size() -> usize {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_base_ms() -> u64 {
    2000
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_broker_channel_size() -> usize {
    100
}

impl WorkerConfig {
    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Webhook Dispatcher tunables (spec §4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    /// Maximum delivery attempts (W).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    /// Gates the http-only-for-loopback rule in the URL policy.
    #[serde(default = "default_true")]
    pub production: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            timeout_secs: default_webhook_timeout_secs(),
            production: true,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_webhook_timeout_secs() -> u64 {
    30
}

impl WebhookConfig {
    pub fn retry_backoff_base(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_base_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Upstream Client tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    pub base_url: Option<String>,
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "processvault/0.1.0".to_string()
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Retention configuration for the Metadata Store's job-pruning loop
/// (`ledger::store::prune_expired_jobs`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl_days: default_job_ttl_days(),
        }
    }
}

fn default_job_ttl_days() -> u32 {
    30
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_addr: default_metrics_addr(),
            otlp_endpoint: None,
        }
    }
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            scheduler: SchedulerConfig::default(),
            worker: WorkerConfig::default(),
            webhook: WebhookConfig::default(),
            upstream: UpstreamConfig::default(),
            retention: RetentionConfig::default(),
            telemetry: TelemetryConfig::default(),
        };

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.worker.batch_size, 5);
        assert_eq!(config.worker.max_retries, 3);
        assert_eq!(config.webhook.max_attempts, 3);
        assert!(config.webhook.production);
    }
}
