//! Job queue storage.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use stockwise_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobKind, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Mark the oldest ready job Running and hand it out.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    /// Whether a job of `kind` is queued (pending or awaiting retry) for the tenant.
    fn has_waiting(&self, tenant_id: TenantId, kind: &JobKind) -> Result<bool, JobStoreError>;

    fn list(&self, tenant_id: TenantId, kind: Option<&JobKind>) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter list.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn dead_letters(&self, tenant_id: TenantId) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Requeue a dead-lettered job with a fresh attempt count.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;

    /// Drop completed jobs last touched at or before `older_than`, across all
    /// tenants. Returns how many went.
    fn prune_completed(&self, older_than: DateTime<Utc>) -> Result<usize, JobStoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn dead_mut(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".into())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        match self.jobs()?.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let slot = jobs.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
        if slot.tenant_id != job.tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs_mut()?;
        let next = jobs
            .values()
            .filter(|j| j.is_ready(now) && tenant_id.is_none_or(|t| j.tenant_id == t))
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| jobs.get_mut(&id)).map(|job| {
            job.mark_running(now);
            job.clone()
        }))
    }

    fn has_waiting(&self, tenant_id: TenantId, kind: &JobKind) -> Result<bool, JobStoreError> {
        Ok(self
            .jobs()?
            .values()
            .any(|j| j.tenant_id == tenant_id && &j.kind == kind && j.status.is_waiting()))
    }

    fn list(&self, tenant_id: TenantId, kind: Option<&JobKind>) -> Result<Vec<Job>, JobStoreError> {
        let mut found: Vec<Job> = self
            .jobs()?
            .values()
            .filter(|j| j.tenant_id == tenant_id && kind.is_none_or(|k| &j.kind == k))
            .cloned()
            .collect();
        found.sort_by_key(|j| j.created_at);
        Ok(found)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dead = self.dead_mut()?;

        let now = Utc::now();
        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = now;
        jobs.remove(&job.id);
        dead.insert(
            job.id,
            DeadLetterEntry {
                job,
                dead_lettered_at: now,
                reason,
            },
        );
        Ok(())
    }

    fn dead_letters(&self, tenant_id: TenantId) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dead = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut found: Vec<DeadLetterEntry> = dead
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.dead_lettered_at);
        Ok(found)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let mut dead = self.dead_mut()?;

        match dead.get(&job_id) {
            None => return Err(JobStoreError::NotFound(job_id)),
            Some(entry) if entry.job.tenant_id != tenant_id => {
                return Err(JobStoreError::TenantIsolation);
            }
            Some(_) => {}
        }
        let mut job = dead
            .remove(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?
            .job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let mut stats = JobStats::default();
        for job in self.jobs()?.values().filter(|j| j.tenant_id == tenant_id) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += self.dead_letters(tenant_id)?.len();
        Ok(stats)
    }

    fn prune_completed(&self, older_than: DateTime<Utc>) -> Result<usize, JobStoreError> {
        let mut jobs = self.jobs_mut()?;
        let before = jobs.len();
        jobs.retain(|_, j| !(j.status == JobStatus::Completed && j.updated_at <= older_than));
        Ok(before - jobs.len())
    }
}
