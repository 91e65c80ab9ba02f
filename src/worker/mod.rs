//! Document Worker pool (spec §4.2, §5): a fixed number of loops, each
//! consuming tickets from its own Broker channel and driving one Job at a
//! time to a terminal state.

pub mod runner;

use std::sync::Arc;

use tracing::{error, info};

pub use runner::{DocumentWorker, WorkerError};

use crate::queue::TicketEnvelope;

/// Spawns one task per worker channel. Each task loops forever, pulling
/// `TicketEnvelope`s and acknowledging them once `run_ticket` returns
/// successfully; a `WorkerError` is logged and the ticket is left
/// un-acked, to be replayed by `redeliver_pending` on the next restart
/// (spec §4.2 "Metadata Store errors inside a Worker").
pub fn spawn_pool(
    worker: Arc<DocumentWorker>,
    receivers: Vec<tokio::sync::mpsc::Receiver<TicketEnvelope>>,
) -> Vec<tokio::task::JoinHandle<()>> {
    receivers
        .into_iter()
        .enumerate()
        .map(|(worker_id, mut rx)| {
            let worker = worker.clone();
            tokio::spawn(async move {
                info!(worker_id, "worker loop started");
                while let Some(envelope) = rx.recv().await {
                    match worker.run_ticket(&envelope.ticket).await {
                        Ok(()) => {
                            if let Err(e) = worker.broker().ack(envelope.seq) {
                                error!(worker_id, seq = envelope.seq, error = %e, "failed to acknowledge ticket");
                            }
                        }
                        Err(e) => {
                            error!(worker_id, seq = envelope.seq, job_id = %envelope.ticket.job_id, error = %e, "job run failed, ticket left pending for redelivery");
                        }
                    }
                }
                info!(worker_id, "worker loop exiting, channel closed");
            })
        })
        .collect()
}
