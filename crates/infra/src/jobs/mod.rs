//! Background jobs with retry, backoff and a dead-letter queue.
//!
//! Jobs are tenant-scoped and routed by kind. A failing job is retried with
//! its policy's backoff until its attempts are spent, then dead-lettered for
//! inspection and manual requeue. Delivery is at-least-once, so handlers must
//! be idempotent.

pub mod executor;
pub mod scheduler;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, Outcome};
pub use scheduler::{SchedulerHandle, SweepScheduler, register_expiry_handler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttempt, JobId, JobKind, JobResult, JobStatus,
    RetryPolicy,
};
