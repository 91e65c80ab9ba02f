use std::sync::Arc;

use crate::config::Config;
use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::projection::StatusProjection;
use crate::queue::Broker;
use crate::scheduler::JobScheduler;
use crate::webhook::WebhookDispatcher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<JobScheduler>,
    pub projection: Arc<StatusProjection>,
    pub webhook: Arc<dyn WebhookDispatcher>,
    pub store: Arc<FjallStore>,
    pub broker: Arc<Broker>,
    pub metrics: Arc<Metrics>,
    pub production: bool,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        scheduler: JobScheduler,
        projection: StatusProjection,
        webhook: Arc<dyn WebhookDispatcher>,
        store: Arc<FjallStore>,
        broker: Arc<Broker>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let production = config.webhook.production;
        Self {
            config: Arc::new(config),
            scheduler: Arc::new(scheduler),
            projection: Arc::new(projection),
            webhook,
            store,
            broker,
            metrics,
            production,
        }
    }
}
