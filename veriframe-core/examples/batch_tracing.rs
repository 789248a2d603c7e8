//! Example demonstrating batch engine tracing instrumentation.
//!
//! Run with: cargo run -p veriframe-core --example batch_tracing

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};
use veriframe_core::{
    BatchOptions, BatchVerificationEngine, ClientError, EngineConfig, MemoryJobStore,
    MockDetector, MockIntegrityLookup, UrlImageSource,
};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber with debug level
    fmt()
        .with_env_filter(EnvFilter::new("veriframe_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Batch Engine Tracing Demo ===\n");

    let ledger = MockIntegrityLookup::new().with_latency(Duration::from_millis(50));
    ledger.register("harbor-01", b"harbor at dawn");
    ledger.register("harbor-02", b"harbor at dusk");
    ledger.fail_with("harbor-04", ClientError::ServiceUnavailable("ledger unavailable".into()));

    let detector = MockDetector::new();
    detector.flag("harbor-02", 0.87);

    let engine = BatchVerificationEngine::new(
        EngineConfig::default().with_max_concurrency(2),
        Arc::new(MemoryJobStore::new()),
        Arc::new(ledger),
        Arc::new(detector),
        Arc::new(UrlImageSource::new("https://images.example/harbor")),
    );

    let ids = ["harbor-01", "harbor-02", "harbor-03", "harbor-04"]
        .map(String::from)
        .to_vec();
    let job_id = match engine
        .submit_batch(
            ids,
            BatchOptions {
                run_detection_analysis: true,
            },
        )
        .await
    {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Failed to submit batch: {}", e);
            return;
        }
    };

    match engine.wait_for_terminal(job_id, Duration::from_secs(10)).await {
        Ok(job) => {
            println!("\nJob {} finished: {}", job.id, job.status);
            for id in &job.image_ids {
                if let Some(result) = job.results.get(id) {
                    println!(
                        "   {:<10} verified={:<5} p={:.2} error={:?}",
                        id, result.verified, result.manipulation_probability, result.error
                    );
                }
            }
        }
        Err(e) => println!("\nFailed: {}", e),
    }

    engine.shutdown().await;
}
