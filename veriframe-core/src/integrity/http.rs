//! HTTP client for the integrity (ledger) service.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{IntegrityLookup, IntegrityRecord};
use crate::error::ClientError;
use crate::http_client::{ServiceClientConfig, ServiceHttpClient};

const SERVICE_NAME: &str = "integrity service";

/// Looks records up with `GET {base}/records/{image_id}`.
pub struct HttpIntegrityClient {
    http: ServiceHttpClient,
}

impl HttpIntegrityClient {
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
impl IntegrityLookup for HttpIntegrityClient {
    #[instrument(level = "debug", skip(self), fields(service = SERVICE_NAME))]
    async fn lookup_integrity(
        &self,
        image_id: &str,
    ) -> Result<Option<IntegrityRecord>, ClientError> {
        let record: Option<IntegrityRecord> = self
            .http
            .get_optional(&["records", image_id])
            .await
            .map_err(|e| match e {
                // Lookups only ever fail as unavailable or timed out.
                ClientError::InvalidInput(msg) => ClientError::ServiceUnavailable(msg),
                other => other,
            })?;

        match &record {
            Some(r) if r.image_id != image_id => {
                return Err(ClientError::ServiceUnavailable(format!(
                    "{SERVICE_NAME} answered for '{}' when asked for '{image_id}'",
                    r.image_id
                )));
            }
            Some(r) => debug!(tx_id = %r.tx_id, chain = %r.chain, "Integrity record found"),
            None => debug!("No integrity record registered"),
        }
        Ok(record)
    }
}
