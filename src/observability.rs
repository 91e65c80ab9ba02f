//! Metrics counters (spec §10.4): in-process atomics surfaced through
//! `snapshot()`. No external metrics exporter is wired up by this crate;
//! `telemetry.metrics_addr` in configuration is reserved for a future
//! Prometheus exporter.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    jobs_admitted: AtomicU64,
    jobs_reused_active: AtomicU64,
    jobs_reused_complete: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    documents_downloaded: AtomicU64,
    documents_failed: AtomicU64,
    webhooks_sent: AtomicU64,
    webhooks_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_admitted(&self) {
        self.jobs_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_reused_active(&self) {
        self.jobs_reused_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_reused_complete(&self) {
        self.jobs_reused_complete.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn document_downloaded(&self) {
        self.documents_downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn document_failed(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_sent(&self) {
        self.webhooks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn webhook_failed(&self) {
        self.webhooks_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_admitted: self.jobs_admitted.load(Ordering::Relaxed),
            jobs_reused_active: self.jobs_reused_active.load(Ordering::Relaxed),
            jobs_reused_complete: self.jobs_reused_complete.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            documents_downloaded: self.documents_downloaded.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            webhooks_sent: self.webhooks_sent.load(Ordering::Relaxed),
            webhooks_failed: self.webhooks_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub jobs_admitted: u64,
    pub jobs_reused_active: u64,
    pub jobs_reused_complete: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub documents_downloaded: u64,
    pub documents_failed: u64,
    pub webhooks_sent: u64,
    pub webhooks_failed: u64,
}
