//! Status command implementation.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use tracing::debug;
use uuid::Uuid;
use veriframe_core::BatchVerificationJob;

use crate::exit_codes::CliError;
use crate::utils::print_job_report;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// URL of a job on the server at `server`.
fn job_url(server: &str, job_id: Uuid) -> String {
    format!("{}/api/v1/batches/{job_id}", server.trim_end_matches('/'))
}

/// Execute the status command.
pub async fn execute(job_id: Uuid, server: String, json: bool) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;

    let url = job_url(&server, job_id);
    debug!(%url, "Fetching job");

    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach server at {server}"))?;

    match response.status() {
        StatusCode::NOT_FOUND => {
            return Err(CliError::NotFound(format!("Job {job_id} not found on {server}")).into())
        }
        StatusCode::SERVICE_UNAVAILABLE => {
            return Err(CliError::Unavailable(format!("Server at {server} is unavailable")).into())
        }
        status if !status.is_success() => bail!("Server returned {status} for job {job_id}"),
        _ => {}
    }

    let job: BatchVerificationJob = response
        .json()
        .await
        .context("Failed to decode job record")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_job_report(&job);
    }
    Ok(())
}
