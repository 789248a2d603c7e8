//! In-memory integrity ledger for tests and offline runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sha3::{Digest, Sha3_256};

use super::{IntegrityLookup, IntegrityRecord};
use crate::error::ClientError;
use crate::probe::ConcurrencyProbe;

/// Mock integrity service backed by a map of registered images.
/// WARNING: records live only in memory and are never anchored anywhere!
#[derive(Default)]
pub struct MockIntegrityLookup {
    records: DashMap<String, IntegrityRecord>,
    failures: DashMap<String, ClientError>,
    outage: RwLock<Option<ClientError>>,
    latency: Option<Duration>,
    next_block: AtomicU64,
    probe: ConcurrencyProbe,
}

impl MockIntegrityLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every lookup by `latency` (simulates a network round trip).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register `content` under `image_id` and return the resulting record.
    pub fn register(&self, image_id: &str, content: &[u8]) -> IntegrityRecord {
        let content_hash = hex::encode(Sha3_256::digest(content));
        let block_height = self.next_block.fetch_add(1, Ordering::Relaxed) + 1;
        let record = IntegrityRecord {
            image_id: image_id.to_string(),
            tx_id: format!("mock-{}", &content_hash[..16]),
            content_hash,
            chain: "mock-ledger".to_string(),
            block_height,
            registered_at: Utc::now(),
        };
        self.records.insert(image_id.to_string(), record.clone());
        record
    }

    /// Make every lookup of `image_id` fail with `error`.
    pub fn fail_with(&self, image_id: &str, error: ClientError) {
        self.failures.insert(image_id.to_string(), error);
    }

    /// Make every lookup fail (`Some`) or restore service (`None`).
    pub fn set_outage(&self, error: Option<ClientError>) {
        if let Ok(mut outage) = self.outage.write() {
            *outage = error;
        }
    }

    /// Instrumentation shared by all calls to this mock.
    pub fn probe(&self) -> &ConcurrencyProbe {
        &self.probe
    }

    fn injected_failure(&self, image_id: &str) -> Option<ClientError> {
        if let Some(err) = self.failures.get(image_id) {
            return Some(err.clone());
        }
        self.outage.read().ok().and_then(|o| o.clone())
    }
}

#[async_trait]
impl IntegrityLookup for MockIntegrityLookup {
    async fn lookup_integrity(
        &self,
        image_id: &str,
    ) -> Result<Option<IntegrityRecord>, ClientError> {
        let _guard = self.probe.enter();
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.injected_failure(image_id) {
            return Err(err);
        }
        Ok(self.records.get(image_id).map(|r| r.value().clone()))
    }
}
