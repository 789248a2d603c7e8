//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use veriframe_core::{
    BatchVerificationEngine, EngineConfig, MemoryJobStore, MockDetector, MockIntegrityLookup,
    UrlImageSource,
};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Batch engine; owns the job store and the service clients
    pub engine: BatchVerificationEngine,
}

impl AppState {
    pub fn new(engine: BatchVerificationEngine) -> Self {
        Self { engine }
    }

    /// In-memory store with mock services (for tests and local development).
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(BatchVerificationEngine::new(
            config,
            Arc::new(MemoryJobStore::new()),
            Arc::new(MockIntegrityLookup::new()),
            Arc::new(MockDetector::new()),
            Arc::new(UrlImageSource::new("http://localhost:8080/images")),
        ))
    }
}
