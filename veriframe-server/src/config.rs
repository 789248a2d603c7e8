//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::time::Duration;

use veriframe_core::{EngineConfig, ServiceClientConfig};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in MB (default: 2)
    pub body_limit_mb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// PostgreSQL URL; in-memory job store when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Integrity (ledger) service base URL; mock ledger when unset
    pub integrity_service_url: Option<String>,
    /// Detection service base URL; mock detector when unset
    pub detection_service_url: Option<String>,
    /// Bearer token sent to both external services
    pub service_api_token: Option<String>,
    /// Base URL images are served from (default: http://localhost:8080/images)
    pub image_base_url: String,
    /// Batch engine limits
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_mb: 2,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            integrity_service_url: None,
            detection_service_url: None,
            service_api_token: None,
            image_base_url: "http://localhost:8080/images".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let body_limit_mb = std::env::var("BODY_LIMIT_MB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(2);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let rate_limit_per_sec = std::env::var("RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let rate_limit_burst = std::env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let image_base_url = std::env::var("IMAGE_BASE_URL")
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Self::default().image_base_url);

        Self {
            port,
            host,
            allowed_origins,
            body_limit_mb,
            timeout_secs,
            rate_limit_enabled,
            rate_limit_per_sec,
            rate_limit_burst,
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections,
            integrity_service_url: non_empty_var("INTEGRITY_SERVICE_URL"),
            detection_service_url: non_empty_var("DETECTION_SERVICE_URL"),
            service_api_token: non_empty_var("SERVICE_API_TOKEN"),
            image_base_url,
            engine: EngineConfig::from_env(),
        }
    }

    /// Reject settings the server cannot run with.
    ///
    /// An enabled rate limiter needs a non-zero replenish period and burst size.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit_enabled && (self.rate_limit_per_sec == 0 || self.rate_limit_burst == 0) {
            anyhow::bail!(
                "invalid rate limit: RATE_LIMIT_PER_SEC={} and RATE_LIMIT_BURST={} must both be non-zero (or set RATE_LIMIT_ENABLED=false)",
                self.rate_limit_per_sec,
                self.rate_limit_burst
            );
        }
        Ok(())
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Client settings for a service at `base_url`.
    ///
    /// Each request is bounded by the smaller of the per-item and HTTP request timeouts.
    pub fn service_client_config(&self, base_url: &str) -> ServiceClientConfig {
        ServiceClientConfig::new(base_url)
            .with_timeout(self.engine.item_timeout.min(Duration::from_secs(self.timeout_secs)))
            .with_api_token(self.service_api_token.clone())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
