//! In-memory job store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::{JobListPage, JobListParams, JobStore};
use crate::error::StoreError;
use crate::job::{BatchVerificationJob, JobStatus};

/// DashMap-backed store. Jobs are lost on restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: DashMap<Uuid, BatchVerificationJob>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(job.id)),
            Entry::Vacant(slot) => {
                slot.insert(job.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        match self.jobs.get_mut(&job.id) {
            Some(mut stored) => {
                *stored = job.clone();
                Ok(())
            }
            None => Err(StoreError::Missing(job.id)),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<BatchVerificationJob>, StoreError> {
        Ok(self.jobs.get(&id).map(|job| job.value().clone()))
    }

    async fn list(&self, params: &JobListParams) -> Result<JobListPage, StoreError> {
        let mut matching: Vec<_> = self
            .jobs
            .iter()
            .filter(|entry| params.matches(entry.value()))
            .map(|entry| entry.value().summary())
            .collect();
        matching.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let (_, limit) = params.normalized();
        let jobs = matching
            .into_iter()
            .skip(params.offset() as usize)
            .take(limit as usize)
            .collect();

        Ok(JobListPage::new(jobs, params, total))
    }

    async fn list_unfinished(&self) -> Result<Vec<BatchVerificationJob>, StoreError> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| matches!(entry.status, JobStatus::Pending | JobStatus::Processing))
            .map(|entry| entry.value().clone())
            .collect())
    }
}
