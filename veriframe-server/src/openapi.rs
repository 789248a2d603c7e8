//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3.0 document for the Veriframe batch verification API.

use utoipa::OpenApi;

use crate::handlers::{
    BatchAcceptedResponse, BatchJobResponse, BatchListResponse, BatchOptionsBody,
    BatchSummaryResponse, HealthResponse, ReadyResponse, SubmitBatchRequest,
};

/// Veriframe Batch Verification API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Veriframe - Batch Verification API",
        version = "0.1.0",
        description = r#"
## Batch Image Verification API

Veriframe checks many images in one job:

- **Integrity lookup** - each image id is looked up in a ledger of registered content hashes
- **AI analysis** - optionally, a detection model scores each image for manipulation
- **Background jobs** - batches run with bounded concurrency and report progress as they go

### How It Works

1. **Submit** image ids via `POST /api/v1/batches` and receive a job id
2. **Poll** `GET /api/v1/batches/{id}` for progress and per-image results
3. **Cancel** a running job, **resume** one interrupted by a restart, or **retry** the
   images that failed

An image is *verified* when a ledger record exists and the detection model (if run)
did not flag it. A failing service never fails the batch; the image result carries the
error instead.
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Batches", description = "Submit, inspect and control batch verification jobs"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::batches::submit_batch_handler,
        crate::handlers::batches::list_batches_handler,
        crate::handlers::batches::get_batch_handler,
        crate::handlers::batches::cancel_batch_handler,
        crate::handlers::batches::resume_batch_handler,
        crate::handlers::batches::retry_batch_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            SubmitBatchRequest,
            BatchOptionsBody,
            BatchAcceptedResponse,
            BatchJobResponse,
            BatchSummaryResponse,
            BatchListResponse,
        )
    )
)]
pub struct ApiDoc;
