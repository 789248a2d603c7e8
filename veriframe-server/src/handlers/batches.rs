//! Batch job handlers
//!
//! Submission, inspection and control of batch verification jobs.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use veriframe_core::{
    BatchOptions, BatchVerificationJob, BatchVerificationResult, JobListPage, JobListParams,
    JobStatus, JobSummary, SubmitRequest,
};

use crate::error::ApiError;
use crate::handlers::AppState;

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Maximum accepted length of a caller id.
const MAX_USER_ID_LEN: usize = 128;

fn owner_from_headers(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };
    let owner = value
        .to_str()
        .map_err(|_| ApiError::bad_request("x-user-id must be visible ASCII"))?
        .trim();
    if owner.is_empty() {
        return Ok(None);
    }
    if owner.len() > MAX_USER_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "x-user-id exceeds {MAX_USER_ID_LEN} characters"
        )));
    }
    Ok(Some(owner.to_string()))
}

/// Per-batch options
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, ToSchema)]
pub struct BatchOptionsBody {
    /// Also run AI manipulation analysis on every image
    #[serde(default)]
    pub run_detection_analysis: bool,
}

impl From<BatchOptionsBody> for BatchOptions {
    fn from(body: BatchOptionsBody) -> Self {
        Self {
            run_detection_analysis: body.run_detection_analysis,
        }
    }
}

impl From<BatchOptions> for BatchOptionsBody {
    fn from(options: BatchOptions) -> Self {
        Self {
            run_detection_analysis: options.run_detection_analysis,
        }
    }
}

/// Request body for batch submission
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitBatchRequest {
    /// Image ids to verify; must be distinct and non-blank
    #[schema(example = json!(["img-001", "img-002"]))]
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub options: BatchOptionsBody,
    /// Optional caller-chosen job id
    #[serde(default)]
    pub job_id: Option<Uuid>,
}

/// Response for accepted submissions, resumes and retries
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchAcceptedResponse {
    pub job_id: Uuid,
    #[schema(value_type = String, example = "processing")]
    pub status: JobStatus,
    /// Set when this job retries an earlier one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
}

impl From<&BatchVerificationJob> for BatchAcceptedResponse {
    fn from(job: &BatchVerificationJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            retry_of: job.retry_of,
        }
    }
}

/// Full job record
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchJobResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "completed")]
    pub status: JobStatus,
    pub total_images: u32,
    pub completed_images: u32,
    /// Percentage of settled images, 0-100
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Per-image results keyed by image id
    #[schema(value_type = Object)]
    pub results: BTreeMap<String, BatchVerificationResult>,
    pub options: BatchOptionsBody,
    /// Why the job failed, if it did
    pub error: Option<String>,
    pub image_ids: Vec<String>,
    pub owner_id: Option<String>,
    pub retry_of: Option<Uuid>,
}

impl From<BatchVerificationJob> for BatchJobResponse {
    fn from(job: BatchVerificationJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            total_images: job.total_images,
            completed_images: job.completed_images,
            progress: job.progress,
            start_time: job.start_time,
            end_time: job.end_time,
            results: job.results,
            options: job.options.into(),
            error: job.error,
            image_ids: job.image_ids,
            owner_id: job.owner_id,
            retry_of: job.retry_of,
        }
    }
}

/// One row of the job history
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchSummaryResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "processing")]
    pub status: JobStatus,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_images: u32,
    pub completed_images: u32,
}

impl From<JobSummary> for BatchSummaryResponse {
    fn from(summary: JobSummary) -> Self {
        Self {
            id: summary.id,
            status: summary.status,
            progress: summary.progress,
            start_time: summary.start_time,
            end_time: summary.end_time,
            total_images: summary.total_images,
            completed_images: summary.completed_images,
        }
    }
}

/// Paginated job history, newest first
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BatchListResponse {
    pub jobs: Vec<BatchSummaryResponse>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub has_more: bool,
}

impl From<JobListPage> for BatchListResponse {
    fn from(page: JobListPage) -> Self {
        Self {
            jobs: page.jobs.into_iter().map(Into::into).collect(),
            page: page.page,
            limit: page.limit,
            total: page.total,
            has_more: page.has_more,
        }
    }
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListBatchesQuery {
    /// Page number (1-indexed)
    #[param(default = 1, minimum = 1)]
    pub page: Option<u32>,

    /// Items per page (max 100)
    #[param(default = 20, minimum = 1, maximum = 100)]
    pub limit: Option<u32>,

    /// Filter by status (pending, processing, completed, failed, cancelled)
    pub status: Option<String>,
}

impl ListBatchesQuery {
    fn into_list_params(self, owner_id: Option<String>) -> Result<JobListParams, ApiError> {
        let status = self
            .status
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<JobStatus>())
            .transpose()
            .map_err(ApiError::bad_request)?;
        let defaults = JobListParams::default();
        Ok(JobListParams {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
            status,
            owner_id,
        })
    }
}

/// Submit a batch
///
/// Validates the image ids, creates the job and starts verifying in the
/// background. Poll `GET /api/v1/batches/{id}` for progress.
#[utoipa::path(
    post,
    path = "/api/v1/batches",
    tag = "Batches",
    request_body = SubmitBatchRequest,
    params(
        ("x-user-id" = Option<String>, Header, description = "Caller identity recorded as the job owner")
    ),
    responses(
        (status = 202, description = "Batch accepted", body = BatchAcceptedResponse),
        (status = 400, description = "Blank or duplicate image ids, or batch too large"),
        (status = 409, description = "Job id already exists")
    )
)]
pub async fn submit_batch_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitBatchRequest>,
) -> Result<(StatusCode, Json<BatchAcceptedResponse>), ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let mut submit = SubmitRequest::new(request.image_ids, request.options.into())
        .with_owner(owner_id);
    submit.job_id = request.job_id;

    let job_id = state.engine.submit(submit).await?;
    let job = state.engine.get_job(job_id).await?;

    Ok((StatusCode::ACCEPTED, Json(BatchAcceptedResponse::from(&job))))
}

/// List batch jobs
///
/// Returns a paginated list of jobs sorted by start time (newest first). When
/// an `x-user-id` header is present only that caller's jobs are listed.
#[utoipa::path(
    get,
    path = "/api/v1/batches",
    tag = "Batches",
    params(
        ListBatchesQuery,
        ("x-user-id" = Option<String>, Header, description = "Restrict the listing to this caller")
    ),
    responses(
        (status = 200, description = "Job history page", body = BatchListResponse),
        (status = 400, description = "Unknown status filter")
    )
)]
pub async fn list_batches_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListBatchesQuery>,
) -> Result<Json<BatchListResponse>, ApiError> {
    let params = query.into_list_params(owner_from_headers(&headers)?)?;
    let page = state.engine.list_jobs(&params).await?;
    Ok(Json(page.into()))
}

/// Get a batch job
#[utoipa::path(
    get,
    path = "/api/v1/batches/{id}",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Full job record", body = BatchJobResponse),
        (status = 404, description = "Unknown job")
    )
)]
pub async fn get_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let job = state.engine.get_job(id).await?;
    Ok(Json(job.into()))
}

/// Cancel a batch job
///
/// Stops dispatching further images. Results already recorded are kept.
#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/cancel",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job cancelled", body = BatchJobResponse),
        (status = 404, description = "Unknown job"),
        (status = 409, description = "Job already finished")
    )
)]
pub async fn cancel_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchJobResponse>, ApiError> {
    let job = state.engine.cancel_job(id).await?;
    Ok(Json(job.into()))
}

/// Resume an interrupted batch job
///
/// Re-dispatches the images of a job left unfinished by a restart.
#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/resume",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 202, description = "Job running", body = BatchAcceptedResponse),
        (status = 404, description = "Unknown job"),
        (status = 409, description = "Job already finished")
    )
)]
pub async fn resume_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<BatchAcceptedResponse>), ApiError> {
    state.engine.resume(id).await?;
    let job = state.engine.get_job(id).await?;
    Ok((StatusCode::ACCEPTED, Json(BatchAcceptedResponse::from(&job))))
}

/// Retry the failed images of a finished batch job
///
/// Creates a new job for images that have no result or whose result carries
/// an error. The original job is left untouched.
#[utoipa::path(
    post,
    path = "/api/v1/batches/{id}/retry",
    tag = "Batches",
    params(("id" = Uuid, Path, description = "Job id")),
    responses(
        (status = 202, description = "Retry job accepted", body = BatchAcceptedResponse),
        (status = 404, description = "Unknown job"),
        (status = 409, description = "Job still running, or nothing to retry")
    )
)]
pub async fn retry_batch_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<BatchAcceptedResponse>), ApiError> {
    let retry_id = state.engine.retry(id).await?;
    let job = state.engine.get_job(retry_id).await?;
    Ok((StatusCode::ACCEPTED, Json(BatchAcceptedResponse::from(&job))))
}
