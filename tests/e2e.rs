//! End-to-end scenarios (spec §8) driving the Job Scheduler, the Document
//! Worker, and the Status Projection together against a shared Metadata
//! Store/Blob Store/Broker, the way `api::run`/`api::run_worker_only` wire
//! them in production.

use std::sync::Arc;
use std::time::Duration;

use processvault::config::{SchedulerConfig, WorkerConfig};
use processvault::domain::JobStatus;
use processvault::ledger::FjallStore;
use processvault::observability::Metrics;
use processvault::projection::OverallStatus;
use processvault::projection::StatusProjection;
use processvault::queue::{Broker, FjallQueue, Ticket};
use processvault::scheduler::{AdmissionDecision, JobScheduler};
use processvault::storage::StorageClient;
use processvault::upstream::fake::{FakeUpstreamClient, FetchOutcome};
use processvault::upstream::{UpstreamDocumentListing, UpstreamProcessMetadata};
use processvault::webhook::fake::FakeWebhookDispatcher;
use processvault::worker::DocumentWorker;
use tempfile::TempDir;

fn listing(id: &str) -> UpstreamDocumentListing {
    UpstreamDocumentListing {
        document_id: id.into(),
        name: format!("{id}.pdf"),
        source_handle: format!("https://upstream/{id}"),
    }
}

struct Harness {
    store: Arc<FjallStore>,
    scheduler: JobScheduler,
    worker: DocumentWorker,
    projection: StatusProjection,
    _tmp: TempDir,
}

fn harness(upstream: FakeUpstreamClient, webhook: FakeWebhookDispatcher, worker_config: WorkerConfig) -> Harness {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(FjallStore::open(tmp.path().join("ledger")).unwrap());
    let queue = Arc::new(FjallQueue::open(tmp.path().join("queue")).unwrap());
    let (broker, _receivers) = Broker::new(queue, 1, 10);
    let broker = Arc::new(broker);
    let storage = Arc::new(StorageClient::in_memory());
    let ttl = Duration::from_secs(3600);

    let upstream: Arc<dyn processvault::upstream::UpstreamClient> = Arc::new(upstream);
    let webhook: Arc<dyn processvault::webhook::WebhookDispatcher> = Arc::new(webhook);

    let scheduler = JobScheduler::new(
        store.clone(),
        broker.clone(),
        upstream.clone(),
        storage.clone(),
        SchedulerConfig::default(),
        true,
        ttl,
        Arc::new(Metrics::new()),
    );
    let worker = DocumentWorker::new(
        store.clone(),
        broker,
        upstream,
        storage.clone(),
        webhook,
        worker_config,
        ttl,
        Arc::new(Metrics::new()),
    );
    let projection = StatusProjection::new(store.clone(), storage, ttl);

    Harness { store, scheduler, worker, projection, _tmp: tmp }
}

/// Scenario A (spec §8): admit an unknown process, run its ticket to
/// completion, and confirm the projection reflects the finished job with
/// re-signed download URLs and a delivered webhook.
#[tokio::test]
async fn scenario_a_admit_process_then_complete_and_notify() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P1", UpstreamProcessMetadata { summary: serde_json::json!({"court": "TJSP"}), documents: vec![listing("d1"), listing("d2")] })
        .always_succeeds("https://upstream/d1", b"petition".to_vec())
        .always_succeeds("https://upstream/d2", b"exhibit".to_vec());
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), WorkerConfig::default());

    let admission = h.scheduler.admit("P1", Some("https://example.test/cb".into()), None).await.unwrap();
    assert_eq!(admission.decision, AdmissionDecision::Admitted);

    h.worker.run_ticket(&Ticket { job_id: admission.job_id.clone() }).await.unwrap();

    let job = h.store.get_job(&admission.job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.webhook_sent);

    let status = h.projection.project("P1").await.unwrap();
    assert_eq!(status.overall_status, OverallStatus::Completed);
    assert_eq!(status.progress_percentage, 100);
    assert!(status.documents.iter().all(|d| d.download_url.is_some()));
}

/// Scenario B (spec §8): one document fails permanently after exhausting
/// retries; the job still reaches a terminal FAILED state and the webhook
/// still fires, carrying the mixed result.
#[tokio::test]
async fn scenario_b_partial_failure_still_notifies() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P2", UpstreamProcessMetadata { summary: serde_json::json!({}), documents: vec![listing("d1"), listing("d2")] })
        .always_succeeds("https://upstream/d1", b"ok".to_vec())
        .script("https://upstream/d2", vec![FetchOutcome::Permanent, FetchOutcome::Permanent, FetchOutcome::Permanent]);
    let mut config = WorkerConfig::default();
    config.retry_backoff_base_ms = 1;
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), config);

    let admission = h.scheduler.admit("P2", Some("https://example.test/cb".into()), None).await.unwrap();
    h.worker.run_ticket(&Ticket { job_id: admission.job_id.clone() }).await.unwrap();

    let job = h.store.get_job(&admission.job_id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.completed_documents, 1);
    assert_eq!(job.failed_documents, 1);
    assert!(job.webhook_sent);

    let status = h.projection.project("P2").await.unwrap();
    assert_eq!(status.overall_status, OverallStatus::Failed);
    assert_eq!(status.completed_documents, 1);
    assert_eq!(status.failed_documents, 1);
}

/// Scenario C (spec §8): admitting the same process twice while a job is
/// still active returns the same job without starting a second download
/// run.
#[tokio::test]
async fn scenario_c_concurrent_admission_reuses_active_job() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P3", UpstreamProcessMetadata { summary: serde_json::json!({}), documents: vec![listing("d1")] });
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), WorkerConfig::default());

    let first = h.scheduler.admit("P3", None, None).await.unwrap();
    let second = h.scheduler.admit("P3", None, None).await.unwrap();

    assert_eq!(first.job_id, second.job_id);
    assert_eq!(second.decision, AdmissionDecision::ReusedActive);
}

/// Scenario D (spec §8): once a job has completed and every document is
/// AVAILABLE, a later admission reuses the result and re-signs fresh
/// download URLs rather than starting a new job.
#[tokio::test]
async fn scenario_d_reuses_completed_result_on_later_admission() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P4", UpstreamProcessMetadata { summary: serde_json::json!({}), documents: vec![listing("d1")] })
        .always_succeeds("https://upstream/d1", b"ok".to_vec());
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), WorkerConfig::default());

    let admission = h.scheduler.admit("P4", None, None).await.unwrap();
    h.worker.run_ticket(&Ticket { job_id: admission.job_id.clone() }).await.unwrap();

    let second = h.scheduler.admit("P4", None, None).await.unwrap();
    assert_eq!(second.decision, AdmissionDecision::ReusedComplete);
    assert_eq!(second.job_id, admission.job_id);
    assert!(second.documents[0].download_url.is_some());
}

/// Scenario E (spec §8): an invalid webhook URL is rejected before any
/// ledger mutation happens, so a later valid admission starts cleanly.
#[tokio::test]
async fn scenario_e_invalid_webhook_rejected_before_any_admission() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P5", UpstreamProcessMetadata { summary: serde_json::json!({}), documents: vec![listing("d1")] });
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), WorkerConfig::default());

    let err = h.scheduler.admit("P5", Some("http://not-loopback.example/cb".into()), None).await.unwrap_err();
    assert!(matches!(err, processvault::scheduler::SchedulerError::InvalidWebhook(_)));
    assert!(h.store.get_process("P5").unwrap().is_none());

    let admission = h.scheduler.admit("P5", None, None).await.unwrap();
    assert_eq!(admission.decision, AdmissionDecision::Admitted);
}

/// Scenario F (spec §8): a job cancelled before a worker ever picks up its
/// ticket is a safe no-op for the PENDING-guard (spec §4.2 step 1) — the
/// worker never downloads anything and never fires the registered webhook.
#[tokio::test]
async fn scenario_f_ticket_for_a_cancelled_job_is_a_no_op() {
    let upstream = FakeUpstreamClient::new()
        .with_process("P6", UpstreamProcessMetadata { summary: serde_json::json!({}), documents: vec![listing("d1")] });
    let h = harness(upstream, FakeWebhookDispatcher::always_succeeds(), WorkerConfig::default());

    let admission = h.scheduler.admit("P6", Some("https://example.test/cb".into()), None).await.unwrap();

    let mut job = h.store.get_job(&admission.job_id).unwrap().unwrap();
    h.store.commit_job_transition(&mut job, JobStatus::Cancelled, |j| j.completed_at = Some(chrono::Utc::now())).unwrap();

    h.worker.run_ticket(&Ticket { job_id: admission.job_id.clone() }).await.unwrap();

    let final_job = h.store.get_job(&admission.job_id).unwrap().unwrap();
    assert_eq!(final_job.status, JobStatus::Cancelled);
    assert!(!final_job.webhook_sent);
}

/// Broker redelivery (spec §7): a ticket persisted but never picked up
/// before a crash is replayed to a fresh worker pool on restart.
#[tokio::test]
async fn crash_recovery_redelivers_pending_tickets_to_a_new_broker() {
    let tmp = TempDir::new().unwrap();
    let queue_path = tmp.path().join("queue");

    {
        let queue = Arc::new(FjallQueue::open(&queue_path).unwrap());
        let (_broker, _receivers) = Broker::new(queue.clone(), 1, 10);
        queue.enqueue(&Ticket { job_id: "orphaned-job".into() }).unwrap();
    }

    let queue = Arc::new(FjallQueue::open(&queue_path).unwrap());
    let (broker, mut receivers) = Broker::new(queue, 1, 10);
    let replayed = broker.redeliver_pending().await.unwrap();
    assert_eq!(replayed, 1);

    let envelope = receivers[0].recv().await.unwrap();
    assert_eq!(envelope.ticket.job_id, "orphaned-job");
}
