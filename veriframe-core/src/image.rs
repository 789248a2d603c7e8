//! Resolution of image ids into fetchable references.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ClientError;

/// An image id together with the URL its content is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub image_id: String,
    pub image_url: String,
}

impl ImageRef {
    pub fn new(image_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            image_url: image_url.into(),
        }
    }
}

/// Loads the image references for a whole batch.
///
/// A failure here means the batch cannot be loaded at all and fails the job.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Resolve `image_ids`, returning one reference per id in the same order.
    async fn resolve(&self, image_ids: &[String]) -> Result<Vec<ImageRef>, ClientError>;
}

/// Serves every image from `{base_url}/{image_id}`, with the id percent-encoded
/// as a single path segment.
#[derive(Debug, Clone)]
pub struct UrlImageSource {
    base_url: String,
}

impl UrlImageSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn url_for(&self, image_id: &str) -> Result<String, ClientError> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ClientError::InvalidInput(format!("Invalid image base URL '{}': {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::InvalidInput(format!(
                    "Image base URL '{}' cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(image_id);
        Ok(url.into())
    }
}

#[async_trait]
impl ImageSource for UrlImageSource {
    async fn resolve(&self, image_ids: &[String]) -> Result<Vec<ImageRef>, ClientError> {
        image_ids
            .iter()
            .map(|id| Ok(ImageRef::new(id.clone(), self.url_for(id)?)))
            .collect()
    }
}
