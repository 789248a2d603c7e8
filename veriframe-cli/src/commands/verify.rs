//! Verify command implementation.
//!
//! Runs a batch in-process: the engine, an in-memory job store and the
//! configured service clients all live for the duration of the command.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::{info, warn};
use veriframe_core::{
    BatchError, BatchOptions, BatchVerificationEngine, BatchVerificationJob, EngineConfig,
    HttpDetectionClient, HttpIntegrityClient, IntegrityLookup, JobStatus, ManipulationDetector,
    MemoryJobStore, MockDetector, MockIntegrityLookup, ServiceClientConfig, UrlImageSource,
};

use crate::exit_codes::CliError;
use crate::utils::{print_job_report, read_id_file};

#[derive(Debug, Args)]
pub struct VerifyArgs {
    /// Image ids to verify
    #[arg(value_name = "IDS")]
    pub ids: Vec<String>,

    /// Read image ids from a file, one per line (`#` starts a comment)
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Also run AI manipulation analysis on every image
    #[arg(long)]
    pub detect: bool,

    /// Maximum images verified at once
    #[arg(short, long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Per-image timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Integrity ledger base URL
    #[arg(long, env = "INTEGRITY_SERVICE_URL", value_name = "URL")]
    pub integrity_url: Option<String>,

    /// Detection service base URL (required with --detect)
    #[arg(long, env = "DETECTION_SERVICE_URL", value_name = "URL")]
    pub detection_url: Option<String>,

    /// Base URL images are served from
    #[arg(
        long,
        env = "IMAGE_BASE_URL",
        default_value = "http://localhost:8080/images",
        value_name = "URL"
    )]
    pub image_base_url: String,

    /// Bearer token sent to both services
    #[arg(long, env = "SERVICE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Use in-process mock services instead of the network (for testing)
    #[arg(long)]
    pub mock: bool,

    /// With --mock, leave this image out of the mock ledger (repeatable)
    #[arg(long, value_name = "ID", requires = "mock")]
    pub mock_missing: Vec<String>,

    /// Print the job record as JSON instead of a report
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::from_env();
        if let Some(n) = self.concurrency {
            config = config.with_max_concurrency(n);
        }
        if let Some(secs) = self.timeout {
            config = config.with_item_timeout(Duration::from_secs(secs));
        }
        config
    }

    fn service_config(&self, base_url: &str, config: &EngineConfig) -> ServiceClientConfig {
        ServiceClientConfig::new(base_url)
            .with_timeout(config.item_timeout)
            .with_api_token(self.api_token.clone())
    }

    fn image_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.ids.clone();
        if let Some(path) = &self.file {
            ids.extend(read_id_file(path)?);
        }
        if ids.is_empty() {
            return Err(CliError::Usage("No image ids given; pass IDS or --file".into()).into());
        }
        Ok(ids)
    }

    fn clients(
        &self,
        ids: &[String],
        config: &EngineConfig,
    ) -> Result<(Arc<dyn IntegrityLookup>, Arc<dyn ManipulationDetector>)> {
        if self.mock {
            let missing: HashSet<&str> = self.mock_missing.iter().map(String::as_str).collect();
            let ledger = MockIntegrityLookup::new();
            let mut registered = 0usize;
            for id in ids.iter().filter(|id| !missing.contains(id.as_str())) {
                ledger.register(id, id.as_bytes());
                registered += 1;
            }
            info!(registered, "Using mock services");
            return Ok((Arc::new(ledger), Arc::new(MockDetector::new())));
        }

        let integrity_url = self.integrity_url.as_deref().ok_or_else(|| {
            CliError::Usage(
                "No integrity service configured; pass --integrity-url, set INTEGRITY_SERVICE_URL, or use --mock"
                    .into(),
            )
        })?;
        let integrity = HttpIntegrityClient::new(self.service_config(integrity_url, config))
            .context("Failed to build integrity client")?;

        let detector: Arc<dyn ManipulationDetector> = match &self.detection_url {
            Some(url) => Arc::new(
                HttpDetectionClient::new(self.service_config(url, config))
                    .context("Failed to build detection client")?,
            ),
            None if self.detect => {
                return Err(CliError::Usage(
                    "--detect needs a detection service; pass --detection-url or set DETECTION_SERVICE_URL"
                        .into(),
                )
                .into())
            }
            // Detection is skipped without --detect.
            None => Arc::new(MockDetector::new()),
        };

        Ok((Arc::new(integrity), detector))
    }
}

/// Upper bound on how long a batch may run: every item taking its full
/// timeout, twice over when detection runs too, plus slack.
fn wait_budget(config: &EngineConfig, total: usize, detect: bool) -> Duration {
    let rounds = total.div_ceil(config.max_concurrency.max(1)) as u32;
    let calls = if detect { 2 } else { 1 };
    config.item_timeout * rounds.max(1) * calls + Duration::from_secs(5)
}

/// Execute the verify command.
pub async fn execute(args: VerifyArgs) -> Result<()> {
    let image_ids = args.image_ids()?;
    let config = args.engine_config();
    let (integrity, detector) = args.clients(&image_ids, &config)?;

    let engine = BatchVerificationEngine::new(
        config.clone(),
        Arc::new(MemoryJobStore::new()),
        integrity,
        detector,
        Arc::new(UrlImageSource::new(args.image_base_url.clone())),
    );

    let total = image_ids.len();
    let options = BatchOptions {
        run_detection_analysis: args.detect,
    };
    let job_id = engine
        .submit_batch(image_ids, options)
        .await
        .map_err(|e| match e {
            BatchError::DuplicateImageId(_) | BatchError::InvalidInput(_) => {
                anyhow::Error::new(CliError::Usage(e.to_string()))
            }
            other => anyhow::Error::new(other),
        })?;

    info!(%job_id, total, concurrency = config.max_concurrency, "Batch submitted");

    let job = tokio::select! {
        job = engine.wait_for_terminal(job_id, wait_budget(&config, total, args.detect)) => {
            job.context("Batch did not finish")?
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(%job_id, "Interrupted, cancelling batch");
            engine.cancel_job(job_id).await?
        }
    };

    engine.shutdown().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_banner(&job);
        print_job_report(&job);
    }

    outcome(&job)
}

fn print_banner(job: &BatchVerificationJob) {
    let verified = job.results.values().filter(|r| r.verified).count();
    let total = job.total_images as usize;

    println!();
    if job.status == JobStatus::Completed && verified == total {
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!(
            "{}",
            "║              ALL VERIFIED              ║".green().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".green());
    } else {
        println!("{}", "╔════════════════════════════════════════╗".yellow());
        println!(
            "{}",
            "║           NOT ALL VERIFIED             ║".yellow().bold()
        );
        println!("{}", "╚════════════════════════════════════════╝".yellow());
    }
    println!(
        "   {} {verified} of {total}",
        "Verified:".dimmed()
    );
}

/// Map a finished job onto the command's result.
fn outcome(job: &BatchVerificationJob) -> Result<()> {
    let total = job.total_images as usize;
    match job.status {
        JobStatus::Failed => bail!(
            "Batch failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
        JobStatus::Cancelled => bail!(
            "Batch cancelled after {} of {total} images",
            job.completed_images
        ),
        _ => {}
    }

    let errored = job.results.values().filter(|r| r.error.is_some()).count();
    if total > 0 && errored == total {
        return Err(CliError::Unavailable(format!(
            "All {total} images failed; the ledger or detection service is unavailable"
        ))
        .into());
    }

    let verified = job.results.values().filter(|r| r.verified).count();
    if verified < total {
        return Err(CliError::Unverified {
            unverified: total - verified,
            total,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes::{ExitCode, NETWORK_ERROR, VERIFICATION_FAILED};
    use uuid::Uuid;
    use veriframe_core::BatchVerificationResult;

    fn finished_job(results: &[(&str, bool, Option<&str>)]) -> BatchVerificationJob {
        let ids = results.iter().map(|(id, _, _)| id.to_string()).collect();
        let mut job = BatchVerificationJob::new(Uuid::new_v4(), ids, BatchOptions::default(), None);
        job.mark_processing();
        for (id, verified, error) in results {
            job.record_result(BatchVerificationResult {
                image_id: id.to_string(),
                image_url: format!("http://img/{id}"),
                verified: *verified,
                manipulation_probability: 0.0,
                blockchain_record: None,
                ai_analysis: None,
                error: error.map(str::to_string),
                verified_at: chrono::Utc::now(),
            });
        }
        job.finish(JobStatus::Completed, None);
        job
    }

    #[test]
    fn test_outcome_all_verified() {
        let job = finished_job(&[("a", true, None), ("b", true, None)]);
        assert!(outcome(&job).is_ok());
    }

    #[test]
    fn test_outcome_some_unverified() {
        let job = finished_job(&[("a", true, None), ("b", false, None)]);
        let err = outcome(&job).unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, VERIFICATION_FAILED);
    }

    #[test]
    fn test_outcome_every_lookup_failed() {
        let job = finished_job(&[
            ("a", false, Some("Integrity service unavailable")),
            ("b", false, Some("Integrity service unavailable")),
        ]);
        let err = outcome(&job).unwrap_err();
        assert_eq!(ExitCode::from_anyhow(&err).code, NETWORK_ERROR);
    }

    #[test]
    fn test_wait_budget_scales_with_rounds() {
        let config = EngineConfig::default()
            .with_max_concurrency(4)
            .with_item_timeout(Duration::from_secs(10));
        assert_eq!(wait_budget(&config, 8, false), Duration::from_secs(25));
        assert_eq!(wait_budget(&config, 8, true), Duration::from_secs(45));
        assert_eq!(wait_budget(&config, 0, false), Duration::from_secs(15));
    }
}
