//! Job executor thread with a handler registry and retry bookkeeping.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use stockwise_core::TenantId;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobResult, JobStatus};

pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    /// Thread name, also used in log lines.
    pub name: String,
    pub tenant_id: Option<TenantId>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "stockwise-jobs".to_string(),
            tenant_id: None,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_poll_interval(mut self, every: Duration) -> Self {
        self.poll_interval = every;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop after the job in hand, if any, and wait for the thread.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        lock_stats(&self.stats).clone()
    }
}

fn lock_stats(stats: &Mutex<ExecutorStats>) -> MutexGuard<'_, ExecutorStats> {
    stats.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of running one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    WillRetry(String),
    DeadLettered(String),
}

/// Claims jobs from a store and runs the handler registered for their kind.
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    handlers: HashMap<String, JobHandler>,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    /// Claim and run the next ready job. `None` when the queue is idle.
    pub fn run_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Outcome>, JobStoreError> {
        match self.store.claim_next(tenant_id)? {
            Some(mut job) => self.run(&mut job).map(Some),
            None => Ok(None),
        }
    }

    /// Run a job that has already been claimed (status Running).
    pub fn run(&self, job: &mut Job) -> Result<Outcome, JobStoreError> {
        let started = Utc::now();
        let result = match self.handlers.get(job.kind.name()) {
            Some(handler) => handler(job),
            None => JobResult::Failure(format!("no handler for job kind {}", job.kind)),
        };

        match result {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job)?;
                debug!(job_id = %job.id, kind = %job.kind, "job completed");
                Ok(Outcome::Succeeded)
            }
            JobResult::Failure(err) => self.fail(job, err, started, None),
            JobResult::RetryAfter(delay) => {
                self.fail(job, "retry requested".to_string(), started, Some(delay))
            }
        }
    }

    fn fail(
        &self,
        job: &mut Job,
        err: String,
        started: chrono::DateTime<Utc>,
        delay: Option<Duration>,
    ) -> Result<Outcome, JobStoreError> {
        job.mark_failed(err.clone(), started, delay);
        self.store.update(job)?;
        if matches!(job.status, JobStatus::DeadLettered { .. }) {
            warn!(
                job_id = %job.id,
                tenant_id = %job.tenant_id,
                kind = %job.kind,
                attempts = job.attempt,
                error = %err,
                "job dead-lettered"
            );
            self.store.dead_letter(job.clone(), err.clone())?;
            return Ok(Outcome::DeadLettered(err));
        }
        debug!(job_id = %job.id, attempt = job.attempt, error = %err, "job failed, will retry");
        Ok(Outcome::WillRetry(err))
    }

    pub fn spawn(self, config: JobExecutorConfig) -> io::Result<JobExecutorHandle> {
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let thread_stats = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || self.run_loop(&config, &shutdown_rx, &thread_stats))?;

        Ok(JobExecutorHandle {
            shutdown,
            join: Some(join),
            stats,
        })
    }

    fn run_loop(
        &self,
        config: &JobExecutorConfig,
        shutdown: &mpsc::Receiver<()>,
        stats: &Mutex<ExecutorStats>,
    ) {
        info!(executor = %config.name, "job executor started");
        let started = Instant::now();

        loop {
            if !matches!(shutdown.try_recv(), Err(mpsc::TryRecvError::Empty)) {
                break;
            }

            let outcome = self.run_next(config.tenant_id);
            let mut s = lock_stats(stats);
            s.uptime_secs = started.elapsed().as_secs();
            match outcome {
                Ok(Some(outcome)) => {
                    s.jobs_processed += 1;
                    match outcome {
                        Outcome::Succeeded => s.jobs_succeeded += 1,
                        Outcome::WillRetry(_) => s.jobs_failed += 1,
                        Outcome::DeadLettered(_) => {
                            s.jobs_failed += 1;
                            s.jobs_dead_lettered += 1;
                        }
                    }
                }
                Ok(None) => {
                    drop(s);
                    thread::sleep(config.poll_interval);
                }
                Err(err) => {
                    drop(s);
                    error!(executor = %config.name, error = %err, "job store failure");
                    thread::sleep(config.poll_interval);
                }
            }
        }

        info!(executor = %config.name, "job executor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::{JobKind, RetryPolicy};

    fn queue_one(store: &InMemoryJobStore, kind: &str, policy: RetryPolicy) -> TenantId {
        let tenant = TenantId::new();
        store
            .enqueue(Job::new(tenant, JobKind::new(kind), serde_json::json!({})).with_retry_policy(policy))
            .unwrap();
        tenant
    }

    #[test]
    fn successful_job_completes() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("noop", |_| JobResult::Success);
        let tenant = queue_one(&store, "noop", RetryPolicy::default());

        assert_eq!(executor.run_next(Some(tenant)).unwrap(), Some(Outcome::Succeeded));
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
        assert_eq!(executor.run_next(Some(tenant)).unwrap(), None);
    }

    #[test]
    fn failing_job_is_dead_lettered_after_its_attempts() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("flaky", |_| JobResult::Failure("boom".into()));
        let tenant = queue_one(&store, "flaky", RetryPolicy::fixed(2, Duration::ZERO));

        assert!(matches!(
            executor.run_next(Some(tenant)).unwrap(),
            Some(Outcome::WillRetry(_))
        ));
        assert!(matches!(
            executor.run_next(Some(tenant)).unwrap(),
            Some(Outcome::DeadLettered(_))
        ));
        assert_eq!(store.dead_letters(tenant).unwrap().len(), 1);
    }

    #[test]
    fn unknown_kind_fails_instead_of_hanging() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor = JobExecutor::new(store.clone());
        let tenant = queue_one(&store, "nobody.listens", RetryPolicy::fixed(1, Duration::ZERO));

        assert!(matches!(
            executor.run_next(Some(tenant)).unwrap(),
            Some(Outcome::DeadLettered(msg)) if msg.contains("no handler")
        ));
    }

    #[test]
    fn spawned_executor_drains_the_queue() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("noop", |_| JobResult::Success);
        let tenant = queue_one(&store, "noop", RetryPolicy::default());

        let handle = executor
            .spawn(JobExecutorConfig::default().with_poll_interval(Duration::from_millis(5)))
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().jobs_succeeded == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.stats().jobs_succeeded, 1);
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
        handle.shutdown();
    }
}
