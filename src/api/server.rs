use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{admit_process, get_process_status, health, test_connectivity, validate_webhook},
    state::AppState,
};
use crate::config::Config;
use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::projection::StatusProjection;
use crate::queue::{Broker, FjallQueue};
use crate::scheduler::JobScheduler;
use crate::storage::StorageClient;
use crate::upstream::HttpUpstreamClient;
use crate::webhook::{HttpWebhookDispatcher, WebhookDispatcher};
use crate::worker::{self, DocumentWorker};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Builds the shared collaborators (Metadata Store, Blob Store, Broker,
/// Upstream Client, Webhook Dispatcher) from configuration. Used by both
/// `serve` (HTTP + worker pool) and `worker` (worker pool only).
pub struct Wiring {
    pub config: Config,
    pub store: Arc<FjallStore>,
    pub storage: Arc<StorageClient>,
    pub broker: Arc<Broker>,
    pub worker_receivers: Vec<tokio::sync::mpsc::Receiver<crate::queue::TicketEnvelope>>,
    pub upstream: Arc<dyn crate::upstream::UpstreamClient>,
    pub webhook: Arc<dyn WebhookDispatcher>,
    pub metrics: Arc<Metrics>,
}

pub async fn build_wiring(config: Config) -> Result<Wiring, AnyError> {
    info!(path = %config.server.fjall_path.display(), "opening metadata store");
    let store = Arc::new(FjallStore::open(&config.server.fjall_path)?);

    let storage = Arc::new(StorageClient::from_config(&config.storage)?);

    let queue_path = config
        .server
        .fjall_path
        .parent()
        .map(|p| p.join("queue"))
        .unwrap_or_else(|| std::path::PathBuf::from("data/queue"));
    info!(path = ?queue_path, "opening work broker queue");
    let queue = Arc::new(FjallQueue::open(&queue_path)?);
    let (broker, worker_receivers) = Broker::new(queue, config.worker.pool_size, config.worker.broker_channel_size);
    let broker = Arc::new(broker);

    let replayed = broker.redeliver_pending().await?;
    if replayed > 0 {
        info!(replayed, "redelivered pending tickets from a prior run");
    }

    let upstream: Arc<dyn crate::upstream::UpstreamClient> =
        Arc::new(HttpUpstreamClient::from_config(&config.upstream)?);
    let webhook: Arc<dyn WebhookDispatcher> = Arc::new(HttpWebhookDispatcher::from_config(&config.webhook));
    let metrics = Arc::new(Metrics::new());

    Ok(Wiring { config, store, storage, broker, worker_receivers, upstream, webhook, metrics })
}

/// Runs the HTTP ingress plus a worker pool in the same process (spec §10.6
/// `serve`).
pub async fn run(address: SocketAddr, config: Config) -> Result<(), AnyError> {
    let wiring = build_wiring(config).await?;
    let Wiring { config, store, storage, broker, worker_receivers, upstream, webhook, metrics } = wiring;

    let presigned_url_ttl = config.storage.presigned_url_ttl();

    let document_worker = Arc::new(DocumentWorker::new(
        store.clone(),
        broker.clone(),
        upstream.clone(),
        storage.clone(),
        webhook.clone(),
        config.worker.clone(),
        presigned_url_ttl,
        metrics.clone(),
    ));
    worker::spawn_pool(document_worker, worker_receivers);

    let scheduler = JobScheduler::new(
        store.clone(),
        broker.clone(),
        upstream,
        storage.clone(),
        config.scheduler.clone(),
        config.webhook.production,
        presigned_url_ttl,
        metrics.clone(),
    );
    let projection = StatusProjection::new(store.clone(), storage, presigned_url_ttl);

    let retention = config.retention.clone();
    let pruning_store = store.clone();
    tokio::spawn(async move {
        let ttl = Duration::from_secs(u64::from(retention.job_ttl_days) * 24 * 3600);
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match pruning_store.prune_expired_jobs(ttl) {
                Ok(stats) => info!(?stats, "pruned expired jobs"),
                Err(e) => tracing::error!(error = %e, "job pruning failed"),
            }
        }
    });

    let state = AppState::new(config, scheduler, projection, webhook, store, broker, metrics);

    let app = Router::new()
        .route("/processes/{process_number}", get(admit_process))
        .route("/processes/{process_number}/status", get(get_process_status))
        .route("/webhooks/validate", post(validate_webhook))
        .route("/webhooks/test-connectivity", post(test_connectivity))
        .route("/health", get(health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new());

    let listener = TcpListener::bind(address).await?;
    info!(%address, "processvault API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Runs just the worker pool, with no HTTP ingress (spec §10.6 `worker`).
pub async fn run_worker_only(config: Config) -> Result<(), AnyError> {
    let wiring = build_wiring(config).await?;
    let presigned_url_ttl = wiring.config.storage.presigned_url_ttl();

    let document_worker = Arc::new(DocumentWorker::new(
        wiring.store,
        wiring.broker,
        wiring.upstream,
        wiring.storage,
        wiring.webhook,
        wiring.config.worker,
        presigned_url_ttl,
        wiring.metrics,
    ));
    let handles = worker::spawn_pool(document_worker, wiring.worker_receivers);

    info!(pool_size = handles.len(), "worker pool running with no HTTP ingress");
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
