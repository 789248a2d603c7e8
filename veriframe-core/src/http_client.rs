//! JSON-over-HTTP client with retry and backoff.
//!
//! Shared by the integrity and detection clients. Transient failures
//! (connect errors, timeouts, 429/502/503/504) are retried with exponential
//! backoff; everything else fails immediately.

use std::time::{Duration, Instant};

use backoff::{future::retry_notify, ExponentialBackoff};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::ClientError;

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum number of retry rounds.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration for one external service endpoint.
#[derive(Clone)]
pub struct ServiceClientConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Maximum retry rounds for transient errors
    pub max_retries: u32,
    /// Initial retry interval
    pub initial_interval: Duration,
    /// Maximum retry interval
    pub max_interval: Duration,
    /// Optional bearer token
    pub api_token: Option<String>,
}

impl ServiceClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            api_token: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_token(mut self, token: Option<String>) -> Self {
        self.api_token = token.filter(|t| !t.is_empty());
        self
    }
}

impl std::fmt::Debug for ServiceClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// HTTP client bound to one service.
pub struct ServiceHttpClient {
    client: Client,
    config: ServiceClientConfig,
    service_name: &'static str,
}

impl ServiceHttpClient {
    pub fn new(config: ServiceClientConfig, service_name: &'static str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                ClientError::ServiceUnavailable(format!(
                    "Failed to create {service_name} HTTP client: {e}"
                ))
            })?;

        Ok(Self {
            client,
            config,
            service_name,
        })
    }

    pub fn config(&self) -> &ServiceClientConfig {
        &self.config
    }

    /// Build `{base_url}/{segments...}`, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            ClientError::ServiceUnavailable(format!(
                "Invalid {} base URL '{}': {e}",
                self.service_name, self.config.base_url
            ))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::ServiceUnavailable(format!(
                    "{} base URL cannot carry a path",
                    self.service_name
                ))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET the endpoint at `segments`, returning `Ok(None)` on 404.
    pub async fn get_optional<R>(&self, segments: &[&str]) -> Result<Option<R>, ClientError>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(Method::GET, &url, None, true).await
    }

    /// POST `body` as JSON to the endpoint at `segments`.
    pub async fn post_json<R>(
        &self,
        segments: &[&str],
        body: &serde_json::Value,
    ) -> Result<R, ClientError>
    where
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        self.execute(Method::POST, &url, Some(body), false)
            .await?
            .ok_or_else(|| {
                ClientError::ServiceUnavailable(format!("{} returned no content", self.service_name))
            })
    }

    async fn execute<R>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
        allow_not_found: bool,
    ) -> Result<Option<R>, ClientError>
    where
        R: DeserializeOwned,
    {
        retry_notify(
            self.build_backoff(),
            || {
                let method = method.clone();
                async move { self.execute_once::<R>(method, url, body, allow_not_found).await }
            },
            |err: ClientError, duration: Duration| {
                warn!(
                    service = self.service_name,
                    error = %err,
                    retry_after_ms = duration.as_millis() as u64,
                    "Retry scheduled"
                );
            },
        )
        .await
    }

    async fn execute_once<R>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&serde_json::Value>,
        allow_not_found: bool,
    ) -> Result<Option<R>, backoff::Error<ClientError>>
    where
        R: DeserializeOwned,
    {
        let start = Instant::now();
        let service = self.service_name;

        let mut request = self.client.request(method, url.clone());
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            let latency_ms = start.elapsed().as_millis() as u64;
            let err = classify_request_error(&e, service);
            if is_transient_error(&e) {
                warn!(service, error = %e, latency_ms, "Transient error, will retry");
                backoff::Error::transient(err)
            } else {
                warn!(service, error = %e, latency_ms, "Permanent error, aborting");
                backoff::Error::permanent(err)
            }
        })?;

        let status = response.status();
        debug!(service, status = %status, "Received HTTP response");

        if status == StatusCode::NOT_FOUND && allow_not_found {
            return Ok(None);
        }

        if !status.is_success() {
            let latency_ms = start.elapsed().as_millis() as u64;
            if is_invalid_input_status(status) {
                let detail = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(ClientError::InvalidInput(format!(
                    "{service} rejected request ({status}): {detail}"
                ))));
            }
            let err = ClientError::ServiceUnavailable(format!("{service} returned status: {status}"));
            return if is_transient_status(status) {
                warn!(service, status = %status, latency_ms, "Transient HTTP status, will retry");
                Err(backoff::Error::transient(err))
            } else {
                warn!(service, status = %status, latency_ms, "Permanent HTTP error");
                Err(backoff::Error::permanent(err))
            };
        }

        let parsed: R = response.json().await.map_err(|e| {
            warn!(service, error = %e, "Failed to parse JSON response");
            backoff::Error::permanent(ClientError::ServiceUnavailable(format!(
                "Failed to parse {service} response: {e}"
            )))
        })?;

        debug!(
            service,
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed successfully"
        );
        Ok(Some(parsed))
    }

    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            max_elapsed_time: Some(self.config.timeout * self.config.max_retries.max(1)),
            ..Default::default()
        }
    }
}

fn classify_request_error(error: &reqwest::Error, service: &str) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout(format!("{service} request timed out: {error}"))
    } else {
        ClientError::ServiceUnavailable(format!("{service} request failed: {error}"))
    }
}

/// Check if a reqwest error is transient and should be retried.
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Check if an HTTP status code indicates a transient error.
pub fn is_transient_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
            | StatusCode::BAD_GATEWAY
    )
}

/// Statuses meaning the service understood the request but cannot process this input.
pub fn is_invalid_input_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::UNSUPPORTED_MEDIA_TYPE
    )
}
