//! Scripted detector for tests and offline runs.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use super::{DetectionResult, ManipulationDetector};
use crate::error::ClientError;
use crate::image::ImageRef;
use crate::probe::ConcurrencyProbe;

/// Model version reported by [`MockDetector`].
pub const MOCK_MODEL_VERSION: &str = "mock-detector-1";

/// Mock detector: images are clean unless scripted otherwise.
#[derive(Default)]
pub struct MockDetector {
    scripted: DashMap<String, Result<DetectionResult, ClientError>>,
    latency: Option<Duration>,
    probe: ConcurrencyProbe,
}

impl MockDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Report `image_id` as manipulated with the given score.
    pub fn flag(&self, image_id: &str, score: f64) {
        self.scripted.insert(
            image_id.to_string(),
            Ok(DetectionResult {
                is_manipulated: true,
                manipulation_score: score,
                ..Self::clean_result()
            }),
        );
    }

    /// Answer `image_id` with an exact result (sanitized like real output).
    pub fn respond(&self, image_id: &str, result: DetectionResult) {
        self.scripted.insert(image_id.to_string(), Ok(result));
    }

    pub fn fail_with(&self, image_id: &str, error: ClientError) {
        self.scripted.insert(image_id.to_string(), Err(error));
    }

    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }

    fn clean_result() -> DetectionResult {
        DetectionResult {
            is_manipulated: false,
            manipulation_score: 0.02,
            detected_manipulations: Vec::new(),
            analysis_time: 0.0,
            ai_confidence: 0.9,
            model_version: MOCK_MODEL_VERSION.to_string(),
        }
    }
}

#[async_trait]
impl ManipulationDetector for MockDetector {
    async fn analyze_for_manipulation(
        &self,
        image: &ImageRef,
    ) -> Result<DetectionResult, ClientError> {
        let _guard = self.probe.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.scripted.get(&image.image_id) {
            Some(scripted) => scripted.value().clone().map(DetectionResult::sanitized),
            None => Ok(Self::clean_result()),
        }
    }
}
