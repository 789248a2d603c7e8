//! Verification of a single image.
//!
//! The integrity record is the authoritative signal. Detection only
//! corroborates it: a detection failure degrades the result but never turns
//! it into an error, while an integrity lookup failure does.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::detection::{DetectionResult, ManipulationDetector};
use crate::error::ClientError;
use crate::image::ImageRef;
use crate::integrity::{IntegrityLookup, IntegrityRecord};
use crate::job::BatchVerificationResult;

/// What verifying one image concluded, before it is folded into a result record.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// A record exists and detection (if it ran) found nothing.
    Verified {
        record: IntegrityRecord,
        analysis: Option<DetectionResult>,
    },
    /// No record, or detection flagged the image.
    Unverified {
        record: Option<IntegrityRecord>,
        analysis: Option<DetectionResult>,
    },
    /// The integrity lookup itself failed.
    Failed { error: ClientError },
}

impl ItemOutcome {
    fn from_parts(record: Option<IntegrityRecord>, analysis: Option<DetectionResult>) -> Self {
        let flagged = analysis.as_ref().is_some_and(|a| a.is_manipulated);
        match record {
            Some(record) if !flagged => Self::Verified { record, analysis },
            record => Self::Unverified { record, analysis },
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Fold into the persisted per-image record.
    pub fn into_result(self, image: &ImageRef) -> BatchVerificationResult {
        let verified = self.is_verified();
        let (blockchain_record, ai_analysis, error) = match self {
            Self::Verified { record, analysis } => (Some(record), analysis, None),
            Self::Unverified { record, analysis } => (record, analysis, None),
            Self::Failed { error } => (None, None, Some(error.to_string())),
        };

        BatchVerificationResult {
            image_id: image.image_id.clone(),
            image_url: image.image_url.clone(),
            verified,
            manipulation_probability: ai_analysis
                .as_ref()
                .map_or(0.0, |a| a.manipulation_score),
            blockchain_record,
            ai_analysis,
            error,
            verified_at: Utc::now(),
        }
    }
}

/// Runs the integrity lookup and optional detection for one image.
pub struct ItemVerifier {
    integrity: Arc<dyn IntegrityLookup>,
    detector: Arc<dyn ManipulationDetector>,
    item_timeout: Duration,
}

impl ItemVerifier {
    pub fn new(
        integrity: Arc<dyn IntegrityLookup>,
        detector: Arc<dyn ManipulationDetector>,
        item_timeout: Duration,
    ) -> Self {
        Self {
            integrity,
            detector,
            item_timeout,
        }
    }

    /// Verify one image. Never fails; failures are carried in the result.
    pub async fn verify(&self, image: &ImageRef, run_detection: bool) -> BatchVerificationResult {
        self.evaluate(image, run_detection).await.into_result(image)
    }

    #[instrument(level = "debug", skip_all, fields(image_id = %image.image_id, run_detection))]
    pub async fn evaluate(&self, image: &ImageRef, run_detection: bool) -> ItemOutcome {
        let lookup = self
            .bounded("integrity lookup", self.integrity.lookup_integrity(&image.image_id))
            .await;

        let record = match lookup {
            Ok(record) => record,
            Err(error) => {
                warn!(image_id = %image.image_id, error = %error, "Integrity lookup failed");
                return ItemOutcome::Failed { error };
            }
        };

        if record.is_none() {
            debug!(image_id = %image.image_id, "No integrity record");
        }

        let analysis = if run_detection {
            match self
                .bounded("detection", self.detector.analyze_for_manipulation(image))
                .await
            {
                Ok(analysis) => Some(analysis),
                Err(error) => {
                    warn!(
                        image_id = %image.image_id,
                        error = %error,
                        "Detection unavailable, falling back to integrity record only"
                    );
                    None
                }
            }
        } else {
            None
        };

        ItemOutcome::from_parts(record, analysis)
    }

    async fn bounded<T, F>(&self, call: &str, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        match tokio::time::timeout(self.item_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(format!(
                "{call} exceeded {}ms",
                self.item_timeout.as_millis()
            ))),
        }
    }
}
