//! Periodic reservation expiry.
//!
//! The scheduler thread enqueues one `inventory.reservations.expire` job per
//! tenant each interval, skipping tenants that still have one queued. The
//! handler runs the sweep; a sweep that partly failed is retried whole, which
//! is safe because expiring an already expired reservation is a no-op.
//! Each tick also drops completed sweeps older than the retention window.

use std::io;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::services::ReservationService;
use crate::store::InMemoryStore;

use super::executor::JobExecutor;
use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, RetryPolicy};

/// Register the expiry sweep handler on `executor`.
pub fn register_expiry_handler(executor: &mut JobExecutor, reservations: ReservationService) {
    executor.register_handler(JobKind::EXPIRE_RESERVATIONS, move |job: &Job| {
        match reservations.expire_due(job.tenant_id, Utc::now()) {
            Ok(report) if report.failed.is_empty() => JobResult::Success,
            Ok(report) => JobResult::Failure(format!(
                "{} of {} reservations could not be expired",
                report.failed.len(),
                report.failed.len() + report.expired.len()
            )),
            Err(err) => JobResult::Failure(err.to_string()),
        }
    });
}

pub struct SweepScheduler {
    store: Arc<InMemoryStore>,
    jobs: Arc<dyn JobStore>,
    retry_policy: RetryPolicy,
    completed_retention: chrono::Duration,
}

impl SweepScheduler {
    pub fn new(store: Arc<InMemoryStore>, jobs: Arc<dyn JobStore>, max_attempts: u32) -> Self {
        Self {
            store,
            jobs,
            retry_policy: RetryPolicy::with_max_attempts(max_attempts),
            completed_retention: chrono::Duration::hours(1),
        }
    }

    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.completed_retention =
            chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        self
    }

    /// Enqueue a sweep for every tenant without one already waiting.
    /// Returns how many were enqueued.
    pub fn tick(&self) -> crate::error::ServiceResult<usize> {
        self.prune();
        let kind = JobKind::expire_reservations();
        let mut enqueued = 0;
        for tenant_id in self.store.tenants()? {
            match self.jobs.has_waiting(tenant_id, &kind) {
                Ok(true) => continue,
                Ok(false) => {}
                Err(err) => {
                    warn!(%tenant_id, error = %err, "could not inspect job queue");
                    continue;
                }
            }
            let job = Job::new(tenant_id, kind.clone(), serde_json::json!({}))
                .with_retry_policy(self.retry_policy.clone());
            match self.jobs.enqueue(job) {
                Ok(job_id) => {
                    debug!(%tenant_id, %job_id, "expiry sweep enqueued");
                    enqueued += 1;
                }
                Err(err) => warn!(%tenant_id, error = %err, "could not enqueue expiry sweep"),
            }
        }
        Ok(enqueued)
    }

    fn prune(&self) {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.completed_retention) else {
            return;
        };
        match self.jobs.prune_completed(cutoff) {
            Ok(0) => {}
            Ok(pruned) => debug!(pruned, "completed sweeps pruned"),
            Err(err) => warn!(error = %err, "could not prune completed sweeps"),
        }
    }

    pub fn spawn(self, every: Duration) -> io::Result<SchedulerHandle> {
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();
        let join = thread::Builder::new()
            .name("stockwise-sweep".into())
            .spawn(move || {
                info!(interval_secs = every.as_secs(), "sweep scheduler started");
                while let Err(mpsc::RecvTimeoutError::Timeout) = shutdown_rx.recv_timeout(every) {
                    if let Err(err) = self.tick() {
                        error!(error = %err, "sweep scheduling failed");
                    }
                }
                info!("sweep scheduler stopped");
            })?;
        Ok(SchedulerHandle {
            shutdown,
            join: Some(join),
        })
    }
}

#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::jobs::{InMemoryJobStore, Outcome};
    use crate::services::{ReceiveStock, ReserveStock, ServiceContext, Services};
    use rust_decimal_macros::dec;
    use stockwise_core::{Money, ProductId, Quantity, SourceDocument, TenantId, WarehouseId};
    use stockwise_inventory::{ReservationStatus, StockKey};

    #[test]
    fn scheduled_sweep_expires_due_reservations_once() {
        let svc = Services::new(&Settings::default());
        let tenant = TenantId::new();
        let key = StockKey::new(ProductId::new(), WarehouseId::new());
        let past = Utc::now() - chrono::Duration::hours(2);
        let ctx = ServiceContext::new(tenant, None).at(past);
        svc.costing
            .receive(
                &ctx,
                ReceiveStock {
                    key: key.clone(),
                    quantity: Quantity::from(10),
                    unit_cost: Money::new(dec!(2)),
                    received_at: None,
                    source: SourceDocument::new("BILL", "B-1").unwrap(),
                },
            )
            .unwrap();
        let reservation = svc
            .reservations
            .reserve(
                &ctx,
                ReserveStock {
                    lines: vec![(key.clone(), Quantity::from(4))],
                    ttl_secs: Some(60),
                    reference: None,
                },
            )
            .unwrap();

        let jobs = Arc::new(InMemoryJobStore::new());
        let scheduler = SweepScheduler::new(svc.store.clone(), jobs.clone(), 3);
        let mut executor = JobExecutor::new(jobs.clone());
        register_expiry_handler(&mut executor, svc.reservations.clone());

        assert_eq!(scheduler.tick().unwrap(), 1);
        // Still queued: no second job for the same tenant.
        assert_eq!(scheduler.tick().unwrap(), 0);

        assert_eq!(executor.run_next(Some(tenant)).unwrap(), Some(Outcome::Succeeded));
        let expired = svc
            .reservations
            .get(tenant, reservation.id_typed())
            .unwrap();
        assert_eq!(expired.status(), ReservationStatus::Expired);
        let item = svc.costing.stock_item(tenant, &key).unwrap();
        assert_eq!(item.quantity_reserved(), Quantity::ZERO);

        // A second sweep finds nothing left to do.
        assert_eq!(scheduler.tick().unwrap(), 1);
        assert_eq!(executor.run_next(Some(tenant)).unwrap(), Some(Outcome::Succeeded));
        assert_eq!(item.quantity_available(), Quantity::from(10));
    }

    #[test]
    fn finished_sweeps_do_not_pile_up() {
        let svc = Services::new(&Settings::default());
        let tenant = TenantId::new();
        svc.costing
            .receive(
                &ServiceContext::new(tenant, None),
                ReceiveStock {
                    key: StockKey::new(ProductId::new(), WarehouseId::new()),
                    quantity: Quantity::from(1),
                    unit_cost: Money::new(dec!(2)),
                    received_at: None,
                    source: SourceDocument::new("BILL", "B-1").unwrap(),
                },
            )
            .unwrap();

        let jobs = Arc::new(InMemoryJobStore::new());
        let scheduler = SweepScheduler::new(svc.store.clone(), jobs.clone(), 3)
            .with_completed_retention(Duration::ZERO);
        let mut executor = JobExecutor::new(jobs.clone());
        register_expiry_handler(&mut executor, svc.reservations.clone());

        for _ in 0..20 {
            assert_eq!(scheduler.tick().unwrap(), 1);
            assert_eq!(executor.run_next(Some(tenant)).unwrap(), Some(Outcome::Succeeded));
            assert!(jobs.list(tenant, None).unwrap().len() <= 1);
        }
        scheduler.tick().unwrap();
        assert_eq!(jobs.stats(tenant).unwrap().completed, 0);
    }
}
