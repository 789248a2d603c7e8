//! Batch job records and per-image results.
//!
//! A [`BatchVerificationJob`] is owned by the engine's coordinator while it
//! runs; everything else only ever sees snapshots read back from the job store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detection::DetectionResult;
use crate::integrity::IntegrityRecord;

/// Lifecycle state of a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// `completed`, `failed` and `cancelled` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Per-batch options supplied at submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Run the AI manipulation analysis for every image.
    #[serde(default)]
    pub run_detection_analysis: bool,
}

/// Outcome for a single image. Immutable once recorded on a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchVerificationResult {
    pub image_id: String,
    pub image_url: String,
    pub verified: bool,
    /// Detection score, 0 when detection was not requested or did not run
    pub manipulation_probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockchain_record: Option<IntegrityRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<DetectionResult>,
    /// Set only when this image could not be verified at all
    #[serde(default)]
    pub error: Option<String>,
    pub verified_at: DateTime<Utc>,
}

/// A submitted batch and everything known about it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchVerificationJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub total_images: u32,
    pub completed_images: u32,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: BTreeMap<String, BatchVerificationResult>,
    #[serde(default)]
    pub options: BatchOptions,
    #[serde(default)]
    pub error: Option<String>,
    /// Requested image ids in submission order
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub retry_of: Option<Uuid>,
}

impl BatchVerificationJob {
    /// Create a `pending` job. Callers are expected to have validated `image_ids`.
    pub fn new(
        id: Uuid,
        image_ids: Vec<String>,
        options: BatchOptions,
        owner_id: Option<String>,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            total_images: image_ids.len() as u32,
            completed_images: 0,
            progress: 0.0,
            start_time: Utc::now(),
            end_time: None,
            results: BTreeMap::new(),
            options,
            error: None,
            image_ids,
            owner_id,
            retry_of: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `100 * completed / total`. An empty batch reads 0 until it completes, then 100.
    pub fn compute_progress(&self) -> f64 {
        if self.total_images == 0 {
            return if self.status == JobStatus::Completed {
                100.0
            } else {
                0.0
            };
        }
        100.0 * f64::from(self.completed_images) / f64::from(self.total_images)
    }

    fn refresh_progress(&mut self) {
        self.progress = self.compute_progress();
    }

    pub fn mark_processing(&mut self) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Processing;
        }
    }

    /// Record one settled image.
    ///
    /// Returns `false` (and leaves the job untouched) if the job is terminal,
    /// the id is not part of the batch, or the id already has a result.
    pub fn record_result(&mut self, result: BatchVerificationResult) -> bool {
        if self.is_terminal()
            || self.results.contains_key(&result.image_id)
            || !self.image_ids.iter().any(|id| *id == result.image_id)
        {
            return false;
        }
        self.results.insert(result.image_id.clone(), result);
        self.completed_images = self.results.len() as u32;
        if self.completed_images >= self.total_images {
            self.finish(JobStatus::Completed, None);
        } else {
            self.refresh_progress();
        }
        true
    }

    /// Move to a terminal state and stamp `end_time`. No-op if already terminal.
    pub fn finish(&mut self, status: JobStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.error = error;
        self.end_time = Some(Utc::now());
        self.refresh_progress();
    }

    /// Ids that have no recorded result yet, in submission order.
    pub fn unsettled_image_ids(&self) -> Vec<String> {
        self.image_ids
            .iter()
            .filter(|id| !self.results.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Ids a retry should cover: unsettled ones plus those whose result carries an error.
    pub fn retry_candidates(&self) -> Vec<String> {
        self.image_ids
            .iter()
            .filter(|id| self.results.get(*id).map_or(true, |r| r.error.is_some()))
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            progress: self.progress,
            start_time: self.start_time,
            end_time: self.end_time,
            total_images: self.total_images,
            completed_images: self.completed_images,
        }
    }
}

/// Listing row for the job history view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_images: u32,
    pub completed_images: u32,
}
