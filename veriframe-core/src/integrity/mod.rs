//! Ledger-backed integrity records.
//!
//! An image counts as verified only if the integrity service holds a record
//! for it. Absence of a record is an ordinary answer, not an error.

#[cfg(feature = "network")]
mod http;
mod mock;

#[cfg(feature = "network")]
pub use http::HttpIntegrityClient;
pub use mock::MockIntegrityLookup;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// A registration of an image's content hash on a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityRecord {
    pub image_id: String,
    /// SHA3-256 of the registered content, hex-encoded
    pub content_hash: String,
    /// Chain identifier (e.g., "solana-mainnet", "solana-devnet")
    pub chain: String,
    /// Transaction carrying the registration
    pub tx_id: String,
    pub block_height: u64,
    pub registered_at: DateTime<Utc>,
}

/// Lookup of integrity records by image id.
///
/// Implementations must be safe to call concurrently and must not carry
/// per-call mutable state between calls.
#[async_trait]
pub trait IntegrityLookup: Send + Sync {
    /// Fetch the record for `image_id`, `Ok(None)` if none was ever registered.
    ///
    /// Fails only with [`ClientError::ServiceUnavailable`] or [`ClientError::Timeout`].
    async fn lookup_integrity(&self, image_id: &str)
        -> Result<Option<IntegrityRecord>, ClientError>;
}
