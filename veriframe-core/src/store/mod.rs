//! Durable job records.
//!
//! The engine writes a full job snapshot on every transition and every item
//! completion; readers only ever observe whole records.

mod memory;

pub use memory::MemoryJobStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{BatchVerificationJob, JobStatus, JobSummary};

/// Largest page size a listing will return.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// Query parameters for a job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListParams {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100)
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub owner_id: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for JobListParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
            status: None,
            owner_id: None,
        }
    }
}

impl JobListParams {
    /// Page clamped to >= 1 and limit to [1, 100].
    pub fn normalized(&self) -> (u32, u32) {
        (self.page.max(1), self.limit.clamp(1, MAX_PAGE_LIMIT))
    }

    pub fn offset(&self) -> u64 {
        let (page, limit) = self.normalized();
        u64::from(page - 1) * u64::from(limit)
    }

    /// Whether `job` passes the status and owner filters.
    pub fn matches(&self, job: &BatchVerificationJob) -> bool {
        self.status.map_or(true, |s| s == job.status)
            && self
                .owner_id
                .as_deref()
                .map_or(true, |owner| job.owner_id.as_deref() == Some(owner))
    }
}

/// One page of job summaries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobListPage {
    pub jobs: Vec<JobSummary>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

impl JobListPage {
    pub fn new(jobs: Vec<JobSummary>, params: &JobListParams, total: u64) -> Self {
        let (page, limit) = params.normalized();
        let has_more = params.offset() + (jobs.len() as u64) < total;
        Self {
            jobs,
            page,
            limit,
            total,
            has_more,
        }
    }
}

/// Persistence for batch jobs.
///
/// Implementations must provide read-after-write and atomic whole-record
/// updates, and tolerate concurrent readers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with [`StoreError::Conflict`] if the id exists.
    async fn create(&self, job: &BatchVerificationJob) -> Result<(), StoreError>;

    /// Replace the stored job (last write wins). Fails with [`StoreError::Missing`] if absent.
    async fn update(&self, job: &BatchVerificationJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<BatchVerificationJob>, StoreError>;

    /// Summaries ordered by `start_time` descending.
    async fn list(&self, params: &JobListParams) -> Result<JobListPage, StoreError>;

    /// Jobs still `pending` or `processing`.
    async fn list_unfinished(&self) -> Result<Vec<BatchVerificationJob>, StoreError>;

    async fn health_check(&self) -> bool {
        true
    }
}
