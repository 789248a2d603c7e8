//! HTTP client for the AI detection service.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use super::{DetectionResult, ManipulationDetector};
use crate::error::ClientError;
use crate::http_client::{ServiceClientConfig, ServiceHttpClient};
use crate::image::ImageRef;

const SERVICE_NAME: &str = "detection service";

/// Submits images to `POST {base}/analyze`.
pub struct HttpDetectionClient {
    http: ServiceHttpClient,
}

impl HttpDetectionClient {
    pub fn new(config: ServiceClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: ServiceHttpClient::new(config, SERVICE_NAME)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.http.config().base_url
    }
}

#[async_trait]
impl ManipulationDetector for HttpDetectionClient {
    #[instrument(level = "debug", skip_all, fields(service = SERVICE_NAME, image_id = %image.image_id))]
    async fn analyze_for_manipulation(
        &self,
        image: &ImageRef,
    ) -> Result<DetectionResult, ClientError> {
        let body = json!({
            "image_id": image.image_id,
            "image_url": image.image_url,
        });
        let raw: DetectionResult = self.http.post_json(&["analyze"], &body).await?;
        let result = raw.sanitized();

        debug!(
            is_manipulated = result.is_manipulated,
            score = result.manipulation_score,
            model = %result.model_version,
            "Detection analysis complete"
        );
        Ok(result)
    }
}
