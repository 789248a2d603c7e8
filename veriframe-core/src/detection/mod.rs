//! AI manipulation analysis.
//!
//! Detection is a corroborating signal only. Its output comes from an
//! external model and is clamped into range before anything else sees it.

#[cfg(feature = "network")]
mod http;
mod mock;

#[cfg(feature = "network")]
pub use http::HttpDetectionClient;
pub use mock::{MockDetector, MOCK_MODEL_VERSION};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::image::ImageRef;

/// Kinds of manipulation the detection model reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManipulationType {
    ObjectRemoval,
    ObjectAddition,
    FaceManipulation,
    ColorAdjustment,
    Splicing,
}

/// Normalized bounding box of a suspicious area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ManipulationRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedManipulation {
    #[serde(rename = "type")]
    pub kind: ManipulationType,
    pub confidence: f64,
    #[serde(default)]
    pub regions: Vec<ManipulationRegion>,
    #[serde(default)]
    pub description: String,
}

/// Result of one manipulation analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub is_manipulated: bool,
    pub manipulation_score: f64,
    #[serde(default)]
    pub detected_manipulations: Vec<DetectedManipulation>,
    /// Seconds spent by the model
    pub analysis_time: f64,
    pub ai_confidence: f64,
    pub model_version: String,
}

/// Clamp to [0, 1]; NaN becomes 0.
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

impl ManipulationRegion {
    /// Force every coordinate into [0, 1] and the box inside the image.
    pub fn sanitized(self) -> Self {
        let x = unit(self.x);
        let y = unit(self.y);
        Self {
            x,
            y,
            width: unit(self.width).min(1.0 - x),
            height: unit(self.height).min(1.0 - y),
            confidence: unit(self.confidence),
        }
    }
}

impl DetectionResult {
    /// Range-clamp everything the detection service reported.
    pub fn sanitized(self) -> Self {
        let analysis_time = if self.analysis_time.is_nan() {
            0.0
        } else {
            self.analysis_time.max(0.0)
        };
        Self {
            is_manipulated: self.is_manipulated,
            manipulation_score: unit(self.manipulation_score),
            detected_manipulations: self
                .detected_manipulations
                .into_iter()
                .map(|m| DetectedManipulation {
                    kind: m.kind,
                    confidence: unit(m.confidence),
                    regions: m.regions.into_iter().map(ManipulationRegion::sanitized).collect(),
                    description: m.description,
                })
                .collect(),
            analysis_time,
            ai_confidence: unit(self.ai_confidence),
            model_version: self.model_version,
        }
    }
}

/// Manipulation analysis of a single image.
///
/// Implementations must be `Send + Sync` and safe to call concurrently.
#[async_trait]
pub trait ManipulationDetector: Send + Sync {
    /// Analyze the image behind `image`.
    ///
    /// Fails with [`ClientError::ServiceUnavailable`], [`ClientError::Timeout`],
    /// or [`ClientError::InvalidInput`] when the image cannot be fetched or decoded.
    async fn analyze_for_manipulation(&self, image: &ImageRef)
        -> Result<DetectionResult, ClientError>;
}
