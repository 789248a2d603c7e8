//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod batches;
pub mod health;

pub use crate::state::AppState;
pub use batches::{
    cancel_batch_handler, get_batch_handler, list_batches_handler, resume_batch_handler,
    retry_batch_handler, submit_batch_handler, BatchAcceptedResponse, BatchJobResponse,
    BatchListResponse, BatchOptionsBody, BatchSummaryResponse, ListBatchesQuery,
    SubmitBatchRequest, USER_ID_HEADER,
};
pub use health::{health, ready, HealthResponse, ReadyResponse};
