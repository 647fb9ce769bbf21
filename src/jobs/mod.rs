use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        info!("Starting background job scheduler");

        let mut handles = Vec::new();

        // Repairs appends whose reduction failed after the blob write
        if let Some(every) = self.context.config.replay.interval {
            handles.push(tokio::spawn(Self::reconciliation_job(Arc::clone(&self), every)));
        } else {
            info!("Periodic replay disabled");
        }

        // Spawn monitoring tasks
        handles.push(tokio::spawn(Self::health_check_job(Arc::clone(&self))));

        info!("Background jobs started");
        handles
    }

    /// Rebuild the projection from the event log (runs every `every`)
    async fn reconciliation_job(scheduler: Arc<Self>, every: Duration) {
        let mut interval = interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; start-up replay already ran
        interval.tick().await;

        loop {
            interval.tick().await;
            info!("Running reconciliation replay");

            match tasks::reconcile_projection(&scheduler.context).await {
                Ok(report) => {
                    if report.skipped > 0 {
                        info!("Reconciliation skipped {} unreadable events", report.skipped);
                    }
                }
                Err(e) => error!("Reconciliation replay failed: {}", e),
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(300)); // Every 5 minutes

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    // Silent success - health is good
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
