//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use tracing::debug;
use veriframe_core::{BatchVerificationJob, BatchVerificationResult, JobStatus};

/// Parse an id list: one image id per line, blank lines and `#` comments skipped.
pub fn parse_id_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read image ids from a file (see [`parse_id_lines`]).
pub fn read_id_file(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read id file: {}", path.display()))?;
    let ids = parse_id_lines(&text);
    debug!(path = %path.display(), count = ids.len(), "Read id file");
    Ok(ids)
}

/// Format a timestamp as a human-readable UTC string.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn status_label(status: JobStatus) -> colored::ColoredString {
    match status {
        JobStatus::Completed => status.as_str().green().bold(),
        JobStatus::Failed => status.as_str().red().bold(),
        JobStatus::Cancelled => status.as_str().yellow().bold(),
        JobStatus::Pending | JobStatus::Processing => status.as_str().cyan().bold(),
    }
}

fn result_line(result: &BatchVerificationResult) -> String {
    let verdict = if let Some(error) = &result.error {
        format!("{} {}", "ERROR     ".red().bold(), error.red())
    } else if result.verified {
        "VERIFIED  ".green().bold().to_string()
    } else if result.blockchain_record.is_none() {
        format!("{} {}", "UNVERIFIED".yellow().bold(), "no ledger record".dimmed())
    } else {
        format!(
            "{} {}",
            "UNVERIFIED".yellow().bold(),
            format!(
                "manipulation probability {:.0}%",
                result.manipulation_probability * 100.0
            )
            .dimmed()
        )
    };
    format!("   {:<24} {verdict}", result.image_id)
}

/// Print a job header followed by one line per image in submission order.
pub fn print_job_report(job: &BatchVerificationJob) {
    println!();
    println!("   {} {}", "Job:".dimmed(), job.id);
    println!("   {} {}", "Status:".dimmed(), status_label(job.status));
    println!(
        "   {} {}/{} images ({:.1}%)",
        "Progress:".dimmed(),
        job.completed_images,
        job.total_images,
        job.progress
    );
    println!("   {} {}", "Started:".dimmed(), format_timestamp(job.start_time));
    if let Some(end) = job.end_time {
        println!("   {} {}", "Finished:".dimmed(), format_timestamp(end));
    }
    if let Some(retry_of) = job.retry_of {
        println!("   {} {}", "Retry of:".dimmed(), retry_of);
    }
    if let Some(error) = &job.error {
        println!("   {} {}", "Error:".dimmed(), error.red());
    }

    if !job.image_ids.is_empty() {
        println!();
    }
    for image_id in &job.image_ids {
        match job.results.get(image_id) {
            Some(result) => println!("{}", result_line(result)),
            None => println!("   {:<24} {}", image_id, "not processed".dimmed()),
        }
    }
    println!();
}
