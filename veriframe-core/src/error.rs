use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

/// Failure of a call to one of the external services.
///
/// "Record not found" is never an error: integrity lookups return `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Job store failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Job {0} already exists")]
    Conflict(Uuid),

    #[error("Job {0} does not exist")]
    Missing(Uuid),

    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Errors surfaced synchronously by the batch verification engine.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error("Job {id} is still {status}")]
    NotTerminal { id: Uuid, status: JobStatus },

    #[error("Job {0} already exists")]
    DuplicateJob(Uuid),

    #[error("Image id '{0}' appears more than once in the batch")]
    DuplicateImageId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job {0} has no failed or unsettled images to retry")]
    NothingToRetry(Uuid),

    #[error("Timed out waiting for job {0}")]
    WaitTimeout(Uuid),

    #[error("Job store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, BatchError>;
