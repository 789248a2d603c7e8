//! Veriframe Core - batch image verification
//!
//! This crate verifies batches of images against two external services:
//!
//! - an **integrity service** holding ledger-anchored content-hash records,
//!   whose presence is the authoritative "verified" signal
//! - an optional **detection service** running AI manipulation analysis,
//!   which can only downgrade a verified image, never upgrade one
//!
//! Jobs are tracked through `pending → processing → {completed | failed | cancelled}`
//! and persisted to a [`JobStore`] on every change, so progress can be polled
//! while a batch runs and unfinished jobs can be recovered after a restart.
//!
//! # Features
//!
//! - `network` (default): reqwest-based HTTP clients for both services
//!
//! Mock implementations of both services are always available for tests and
//! offline runs.

pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
#[cfg(feature = "network")]
pub mod http_client;
pub mod image;
pub mod integrity;
pub mod job;
pub mod probe;
pub mod store;
pub mod verifier;

// Re-export main types for convenience
pub use config::EngineConfig;
pub use detection::{
    DetectedManipulation, DetectionResult, ManipulationDetector, ManipulationRegion,
    ManipulationType, MockDetector,
};
pub use engine::{validate_image_ids, BatchVerificationEngine, SubmitRequest};
pub use error::{BatchError, ClientError, Result, StoreError};
pub use image::{ImageRef, ImageSource, UrlImageSource};
pub use integrity::{IntegrityLookup, IntegrityRecord, MockIntegrityLookup};
pub use job::{BatchOptions, BatchVerificationJob, BatchVerificationResult, JobStatus, JobSummary};
pub use probe::ConcurrencyProbe;
pub use store::{JobListPage, JobListParams, JobStore, MemoryJobStore};
pub use verifier::{ItemOutcome, ItemVerifier};

#[cfg(feature = "network")]
pub use detection::HttpDetectionClient;
#[cfg(feature = "network")]
pub use http_client::{ServiceClientConfig, ServiceHttpClient};
#[cfg(feature = "network")]
pub use integrity::HttpIntegrityClient;
