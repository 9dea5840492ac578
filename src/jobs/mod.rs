use std::sync::Arc;
use std::time::Instant;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::metrics;

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
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        if self.context.config.audit.enabled {
            tokio::spawn(Self::integrity_audit_job(Arc::clone(&self)));
        } else {
            info!("Integrity audit disabled");
        }

        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Verify every stored operation log (default: hourly)
    async fn integrity_audit_job(scheduler: Arc<Self>) {
        let audit = &scheduler.context.config.audit;
        let mut interval = interval(Duration::from_secs(audit.interval_secs));

        loop {
            interval.tick().await;
            info!("Running operation log integrity audit");
            let started = Instant::now();

            match tasks::audit_operation_logs(&scheduler.context.directory, audit.batch_size).await {
                Ok(report) => {
                    let status = if report.failed.is_empty() { "success" } else { "failures" };
                    metrics::record_job_run("audit", status);
                    if report.failed.is_empty() {
                        info!(
                            checked = report.checked,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Integrity audit complete"
                        );
                    } else {
                        warn!(
                            checked = report.checked,
                            failed = report.failed.len(),
                            "Integrity audit found invalid operation logs"
                        );
                    }
                }
                Err(e) => {
                    metrics::record_job_run("audit", "error");
                    error!("Integrity audit failed: {}", e);
                }
            }
        }
    }

    /// Health check job (default: every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let secs = scheduler.context.config.audit.health_interval_secs;
        let mut interval = interval(Duration::from_secs(secs));

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context.directory).await {
                Ok(_) => metrics::record_job_run("health", "success"),
                Err(e) => {
                    metrics::record_job_run("health", "error");
                    error!("Health check failed: {}", e);
                }
            }
        }
    }
}
