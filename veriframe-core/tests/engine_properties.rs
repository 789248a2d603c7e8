//! Behavioral tests for the batch verification engine.
//!
//! Every test drives the engine through the public API with mock services.
//! Timing-sensitive tests run on a paused clock so sleeps are deterministic.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use veriframe_core::{
    BatchError, BatchOptions, BatchVerificationEngine, BatchVerificationJob, ClientError,
    EngineConfig, ImageRef, ImageSource, IntegrityLookup, IntegrityRecord, JobListPage,
    JobListParams, JobStatus, JobStore, MemoryJobStore, MockDetector, MockIntegrityLookup,
    StoreError, SubmitRequest, UrlImageSource,
};

const WAIT: Duration = Duration::from_secs(30);

struct Harness {
    engine: BatchVerificationEngine,
    ledger: Arc<MockIntegrityLookup>,
    detector: Arc<MockDetector>,
    store: Arc<MemoryJobStore>,
}

fn harness(config: EngineConfig, ledger: MockIntegrityLookup, detector: MockDetector) -> Harness {
    let ledger = Arc::new(ledger);
    let detector = Arc::new(detector);
    let store = Arc::new(MemoryJobStore::new());
    let engine = BatchVerificationEngine::new(
        config,
        store.clone(),
        ledger.clone(),
        detector.clone(),
        Arc::new(UrlImageSource::new("https://images.test")),
    );
    Harness {
        engine,
        ledger,
        detector,
        store,
    }
}

fn default_harness() -> Harness {
    harness(
        EngineConfig::default(),
        MockIntegrityLookup::new(),
        MockDetector::new(),
    )
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn numbered(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("img-{i:03}")).collect()
}

fn with_detection() -> BatchOptions {
    BatchOptions {
        run_detection_analysis: true,
    }
}

fn assert_progress_consistent(job: &BatchVerificationJob) {
    assert!(job.completed_images <= job.total_images);
    assert_eq!(job.completed_images as usize, job.results.len());
    if job.total_images > 0 {
        let expected = 100.0 * f64::from(job.completed_images) / f64::from(job.total_images);
        assert!(
            (job.progress - expected).abs() < 1e-9,
            "progress {} != {expected}",
            job.progress
        );
    }
}

async fn wait_for_completed_images(engine: &BatchVerificationEngine, job_id: uuid::Uuid, n: u32) {
    loop {
        let job = engine.get_job(job_id).await.unwrap();
        if job.completed_images >= n || job.is_terminal() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

struct OfflineCatalog;

#[async_trait]
impl ImageSource for OfflineCatalog {
    async fn resolve(&self, _image_ids: &[String]) -> Result<Vec<ImageRef>, ClientError> {
        Err(ClientError::ServiceUnavailable("catalog offline".into()))
    }
}

/// Serves every image but the last.
struct TruncatingCatalog;

#[async_trait]
impl ImageSource for TruncatingCatalog {
    async fn resolve(&self, image_ids: &[String]) -> Result<Vec<ImageRef>, ClientError> {
        let keep = image_ids.len().saturating_sub(1);
        Ok(image_ids[..keep]
            .iter()
            .map(|id| ImageRef::new(id.clone(), format!("https://images.test/{id}")))
            .collect())
    }
}

/// Ledger that panics when asked about `"boom"`.
struct PanickingLedger;

#[async_trait]
impl IntegrityLookup for PanickingLedger {
    async fn lookup_integrity(
        &self,
        image_id: &str,
    ) -> Result<Option<IntegrityRecord>, ClientError> {
        if image_id == "boom" {
            panic!("ledger client bug");
        }
        Ok(None)
    }
}

/// Memory store with a slow `create` acknowledgement and one scripted `update` failure.
#[derive(Default)]
struct ScriptedStore {
    jobs: MemoryJobStore,
    create_ack_delay: Duration,
    /// 1-based index of the update call that fails
    fail_update: Option<usize>,
    updates: AtomicUsize,
}

impl ScriptedStore {
    fn with_create_ack_delay(mut self, delay: Duration) -> Self {
        self.create_ack_delay = delay;
        self
    }

    fn failing_update(mut self, n: usize) -> Self {
        self.fail_update = Some(n);
        self
    }
}

#[async_trait]
impl JobStore for ScriptedStore {
    async fn create(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        self.jobs.create(job).await?;
        tokio::time::sleep(self.create_ack_delay).await;
        Ok(())
    }

    async fn update(&self, job: &BatchVerificationJob) -> Result<(), StoreError> {
        let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_update == Some(n) {
            return Err(StoreError::Query("connection reset".into()));
        }
        self.jobs.update(job).await
    }

    async fn get(&self, id: uuid::Uuid) -> Result<Option<BatchVerificationJob>, StoreError> {
        self.jobs.get(id).await
    }

    async fn list(&self, params: &JobListParams) -> Result<JobListPage, StoreError> {
        self.jobs.list(params).await
    }

    async fn list_unfinished(&self) -> Result<Vec<BatchVerificationJob>, StoreError> {
        self.jobs.list_unfinished().await
    }
}

fn engine_with_store(
    store: Arc<dyn JobStore>,
    ledger: Arc<dyn IntegrityLookup>,
) -> BatchVerificationEngine {
    BatchVerificationEngine::new(
        EngineConfig::default().with_max_concurrency(1),
        store,
        ledger,
        Arc::new(MockDetector::new()),
        Arc::new(UrlImageSource::new("https://images.test")),
    )
}

fn assert_failed_with(job: &BatchVerificationJob, reason: &str) {
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.as_deref().unwrap();
    assert!(error.contains(reason), "error {error:?} lacks {reason:?}");
    assert!(job.end_time.is_some());
}

#[tokio::test]
async fn test_mixed_batch_outcomes() {
    let h = default_harness();
    h.ledger.register("a", b"pixels of a");
    h.ledger
        .fail_with("c", ClientError::ServiceUnavailable("ledger node down".into()));

    let job_id = h
        .engine
        .submit_batch(ids(&["a", "b", "c"]), with_detection())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_images, 3);
    assert_eq!(job.progress, 100.0);
    assert!(job.end_time.is_some());
    assert!(job.error.is_none());

    let a = &job.results["a"];
    assert!(a.verified);
    assert!(a.blockchain_record.is_some());
    assert!(a.ai_analysis.is_some());

    let b = &job.results["b"];
    assert!(!b.verified);
    assert!(b.error.is_none());

    let c = &job.results["c"];
    assert!(!c.verified);
    assert!(c.error.as_deref().unwrap().contains("ledger node down"));
    assert!(c.ai_analysis.is_none());

    // Detection runs for a and b but never after a failed lookup.
    assert_eq!(h.detector.probe().calls(), 2);
}

#[tokio::test]
async fn test_empty_batch_completes_immediately() {
    let h = default_harness();
    let job_id = h
        .engine
        .submit_batch(Vec::new(), BatchOptions::default())
        .await
        .unwrap();

    let job = h.engine.get_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100.0);
    assert_eq!(job.total_images, 0);
    assert!(job.results.is_empty());
    assert!(job.error.is_none());
    assert!(job.end_time.is_some());
    assert_eq!(h.engine.active_jobs(), 0);
}

#[tokio::test]
async fn test_no_record_without_detection() {
    let h = default_harness();
    let job_id = h
        .engine
        .submit_batch(ids(&["unregistered"]), BatchOptions::default())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    let result = &job.results["unregistered"];
    assert!(!result.verified);
    assert!(result.error.is_none());
    assert!(result.ai_analysis.is_none());
    assert_eq!(result.manipulation_probability, 0.0);
    assert_eq!(h.detector.probe().calls(), 0);
}

#[tokio::test]
async fn test_lookup_outage_does_not_fail_job() {
    let h = default_harness();
    h.ledger
        .set_outage(Some(ClientError::Timeout("ledger unreachable".into())));

    let job_id = h
        .engine
        .submit_batch(ids(&["a", "b"]), BatchOptions::default())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.error.is_none());
    assert!(job.results.values().all(|r| !r.verified && r.error.is_some()));
}

#[tokio::test]
async fn test_detection_outage_degrades_to_record() {
    let h = default_harness();
    h.ledger.register("a", b"a");
    h.detector
        .fail_with("a", ClientError::ServiceUnavailable("gpu pool drained".into()));

    let job_id = h
        .engine
        .submit_batch(ids(&["a"]), with_detection())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    let a = &job.results["a"];
    assert!(a.verified);
    assert!(a.ai_analysis.is_none());
    assert!(a.error.is_none());
}

#[tokio::test]
async fn test_flagged_image_with_record_is_unverified() {
    let h = default_harness();
    h.ledger.register("a", b"a");
    h.detector.flag("a", 0.87);

    let job_id = h
        .engine
        .submit_batch(ids(&["a"]), with_detection())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    let a = &job.results["a"];
    assert!(!a.verified);
    assert!(a.blockchain_record.is_some());
    assert_eq!(a.manipulation_probability, 0.87);
}

#[tokio::test(start_paused = true)]
async fn test_progress_consistent_while_running() {
    let h = harness(
        EngineConfig::default().with_max_concurrency(3),
        MockIntegrityLookup::new().with_latency(Duration::from_millis(40)),
        MockDetector::new(),
    );
    let job_id = h
        .engine
        .submit_batch(numbered(25), BatchOptions::default())
        .await
        .unwrap();

    let mut last_completed = 0;
    loop {
        let job = h.engine.get_job(job_id).await.unwrap();
        assert_progress_consistent(&job);
        assert!(job.completed_images >= last_completed, "completed count went backwards");
        last_completed = job.completed_images;
        if job.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed);
            assert_eq!(job.completed_images, 25);
            break;
        }
        tokio::time::sleep(Duration::from_millis(7)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_bounded_by_config() {
    let h = harness(
        EngineConfig::default().with_max_concurrency(3),
        MockIntegrityLookup::new().with_latency(Duration::from_millis(100)),
        MockDetector::new().with_latency(Duration::from_millis(100)),
    );
    let job_id = h
        .engine
        .submit_batch(numbered(40), with_detection())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_eq!(job.completed_images, 40);
    assert_eq!(h.ledger.probe().calls(), 40);
    assert_eq!(h.ledger.probe().peak(), 3);
    assert!(h.detector.probe().peak() <= 3);
    assert_eq!(h.ledger.probe().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_freezes_job() {
    let h = harness(
        EngineConfig::default().with_max_concurrency(2),
        MockIntegrityLookup::new().with_latency(Duration::from_millis(50)),
        MockDetector::new(),
    );
    let job_id = h
        .engine
        .submit_batch(numbered(20), BatchOptions::default())
        .await
        .unwrap();
    wait_for_completed_images(&h.engine, job_id, 2).await;

    let cancelled = h.engine.cancel_job(job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.end_time.is_some());
    assert!(cancelled.completed_images < 20);
    assert_progress_consistent(&cancelled);

    // Let anything still in flight settle.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let later = h.engine.get_job(job_id).await.unwrap();
    assert_eq!(later, cancelled);
    assert!(h.ledger.probe().calls() as u32 <= cancelled.completed_images + 2);
    assert_eq!(h.engine.active_jobs(), 0);

    assert!(matches!(
        h.engine.cancel_job(job_id).await,
        Err(BatchError::AlreadyTerminal { status: JobStatus::Cancelled, .. })
    ));
}

#[tokio::test]
async fn test_cancel_unknown_job() {
    let h = default_harness();
    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        h.engine.cancel_job(missing).await,
        Err(BatchError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn test_cancel_completed_job_is_rejected() {
    let h = default_harness();
    let job_id = h
        .engine
        .submit_batch(ids(&["a"]), BatchOptions::default())
        .await
        .unwrap();
    h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert!(matches!(
        h.engine.cancel_job(job_id).await,
        Err(BatchError::AlreadyTerminal { status: JobStatus::Completed, .. })
    ));
}

#[tokio::test]
async fn test_one_result_per_image() {
    let h = default_harness();
    let image_ids = numbered(30);
    let job_id = h
        .engine
        .submit_batch(image_ids.clone(), with_detection())
        .await
        .unwrap();
    let job = h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    let keys: BTreeSet<_> = job.results.keys().cloned().collect();
    let expected: BTreeSet<_> = image_ids.into_iter().collect();
    assert_eq!(keys, expected);
    assert!(job.results.iter().all(|(id, r)| *id == r.image_id));
    assert_eq!(h.ledger.probe().calls(), 30);
}

#[tokio::test]
async fn test_invalid_submissions_create_nothing() {
    let h = harness(
        EngineConfig::default().with_max_batch_size(3),
        MockIntegrityLookup::new(),
        MockDetector::new(),
    );

    assert!(matches!(
        h.engine
            .submit_batch(ids(&["a", "b", "a"]), BatchOptions::default())
            .await,
        Err(BatchError::DuplicateImageId(id)) if id == "a"
    ));
    assert!(matches!(
        h.engine
            .submit_batch(ids(&["a", ""]), BatchOptions::default())
            .await,
        Err(BatchError::InvalidInput(_))
    ));
    assert!(matches!(
        h.engine
            .submit_batch(numbered(4), BatchOptions::default())
            .await,
        Err(BatchError::InvalidInput(_))
    ));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_duplicate_job_id_rejected() {
    let h = default_harness();
    let job_id = uuid::Uuid::new_v4();
    let request = SubmitRequest::new(ids(&["a"]), BatchOptions::default()).with_job_id(job_id);

    assert_eq!(h.engine.submit(request.clone()).await.unwrap(), job_id);
    assert!(matches!(
        h.engine.submit(request).await,
        Err(BatchError::DuplicateJob(id)) if id == job_id
    ));
}

#[tokio::test]
async fn test_image_source_failure_fails_job() {
    let store = Arc::new(MemoryJobStore::new());
    let engine = BatchVerificationEngine::new(
        EngineConfig::default(),
        store,
        Arc::new(MockIntegrityLookup::new()),
        Arc::new(MockDetector::new()),
        Arc::new(OfflineCatalog),
    );

    let job_id = engine
        .submit_batch(ids(&["a", "b"]), BatchOptions::default())
        .await
        .unwrap();
    let job = engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("catalog offline"));
    assert!(job.end_time.is_some());
    assert_eq!(job.completed_images, 0);
}

#[tokio::test]
async fn test_image_source_short_of_refs_fails_job() {
    let engine = BatchVerificationEngine::new(
        EngineConfig::default(),
        Arc::new(MemoryJobStore::new()),
        Arc::new(MockIntegrityLookup::new()),
        Arc::new(MockDetector::new()),
        Arc::new(TruncatingCatalog),
    );

    let job_id = engine
        .submit_batch(ids(&["a", "b", "c"]), BatchOptions::default())
        .await
        .unwrap();
    let job = engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_failed_with(&job, "returned 2 references for 3 images");
    assert_eq!(job.completed_images, 0);
}

#[tokio::test]
async fn test_worker_panic_fails_job() {
    let engine = engine_with_store(Arc::new(MemoryJobStore::new()), Arc::new(PanickingLedger));

    let job_id = engine
        .submit_batch(ids(&["a", "boom", "c"]), BatchOptions::default())
        .await
        .unwrap();
    let job = engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_failed_with(&job, "Verification worker crashed");
    assert!(!job.results.contains_key("boom"));
    assert_progress_consistent(&job);
}

#[tokio::test]
async fn test_store_write_failure_mid_run_fails_job() {
    // Update 1 moves the job to processing; update 2 records the first result.
    let store = Arc::new(ScriptedStore::default().failing_update(2));
    let ledger = Arc::new(MockIntegrityLookup::new());
    for id in ["a", "b", "c"] {
        ledger.register(id, id.as_bytes());
    }
    let engine = engine_with_store(store.clone(), ledger);

    let job_id = engine
        .submit_batch(ids(&["a", "b", "c"]), BatchOptions::default())
        .await
        .unwrap();
    let job = engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert_failed_with(&job, "connection reset");
    assert!(job.completed_images < 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.get_job(job_id).await.unwrap(), job);
    assert_eq!(engine.active_jobs(), 0);
}

#[tokio::test]
async fn test_failed_launch_write_leaves_failed_record() {
    let store = Arc::new(ScriptedStore::default().failing_update(1));
    let engine = engine_with_store(store.clone(), Arc::new(MockIntegrityLookup::new()));
    let job_id = uuid::Uuid::new_v4();

    let request = SubmitRequest::new(ids(&["a", "b"]), BatchOptions::default()).with_job_id(job_id);
    let err = engine.submit(request).await.unwrap_err();
    assert!(matches!(err, BatchError::Store(_)));

    let stored = store.get(job_id).await.unwrap().unwrap();
    assert_failed_with(&stored, "connection reset");
    assert_eq!(stored.completed_images, 0);
    assert_eq!(engine.active_jobs(), 0);

    // Nothing left for recovery to pick up.
    assert_eq!(engine.recover().await.unwrap(), 0);
    assert_eq!(engine.get_job(job_id).await.unwrap(), stored);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_submit_is_persisting() {
    let store =
        Arc::new(ScriptedStore::default().with_create_ack_delay(Duration::from_millis(200)));
    let ledger = Arc::new(MockIntegrityLookup::new());
    ledger.register("a", b"pixels of a");
    ledger.register("b", b"pixels of b");
    let engine = engine_with_store(store, ledger.clone());
    let job_id = uuid::Uuid::new_v4();

    let request = SubmitRequest::new(ids(&["a", "b"]), BatchOptions::default()).with_job_id(job_id);
    let submitting = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit(request).await }
    });

    // The record is stored but submit has not returned yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = engine.cancel_job(job_id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.end_time.is_some());

    assert_eq!(submitting.await.unwrap().unwrap(), job_id);
    tokio::time::sleep(Duration::from_millis(500)).await;

    let job = engine.get_job(job_id).await.unwrap();
    assert_eq!(job, cancelled);
    assert_eq!(job.completed_images, 0);
    assert_eq!(ledger.probe().calls(), 0);
    assert_eq!(engine.active_jobs(), 0);
}

#[tokio::test]
async fn test_resume_after_orphan_cancel_is_rejected() {
    let h = default_harness();
    let job = BatchVerificationJob::new(
        uuid::Uuid::new_v4(),
        ids(&["a", "b"]),
        BatchOptions::default(),
        None,
    );
    h.store.create(&job).await.unwrap();

    let cancelled = h.engine.cancel_job(job.id).await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);

    assert!(matches!(
        h.engine.resume(job.id).await,
        Err(BatchError::AlreadyTerminal { status: JobStatus::Cancelled, .. })
    ));
    assert_eq!(h.engine.get_job(job.id).await.unwrap(), cancelled);
    assert_eq!(h.ledger.probe().calls(), 0);
}

#[tokio::test]
async fn test_retry_covers_failed_images_only() {
    let h = default_harness();
    h.ledger.register("a", b"a");
    h.ledger.register("c", b"c");
    h.ledger
        .fail_with("c", ClientError::Timeout("slow ledger".into()));

    let original = h
        .engine
        .submit(
            SubmitRequest::new(ids(&["a", "b", "c"]), BatchOptions::default())
                .with_owner(Some("auditor-7".into())),
        )
        .await
        .unwrap();
    h.engine.wait_for_terminal(original, WAIT).await.unwrap();

    let healthy = MockIntegrityLookup::new();
    healthy.register("c", b"c");
    let retry_engine = BatchVerificationEngine::new(
        EngineConfig::default(),
        h.store.clone(),
        Arc::new(healthy),
        Arc::new(MockDetector::new()),
        Arc::new(UrlImageSource::new("https://images.test")),
    );

    let retried = retry_engine.retry(original).await.unwrap();
    assert_ne!(retried, original);
    let job = retry_engine.wait_for_terminal(retried, WAIT).await.unwrap();

    assert_eq!(job.retry_of, Some(original));
    assert_eq!(job.image_ids, ids(&["c"]));
    assert_eq!(job.owner_id.as_deref(), Some("auditor-7"));
    assert!(job.results["c"].verified);

    // The original record is left untouched.
    let original_job = h.engine.get_job(original).await.unwrap();
    assert!(original_job.results["c"].error.is_some());
}

#[tokio::test]
async fn test_retry_preconditions() {
    let h = harness(
        EngineConfig::default(),
        MockIntegrityLookup::new().with_latency(Duration::from_secs(5)),
        MockDetector::new(),
    );
    let running = h
        .engine
        .submit_batch(ids(&["a"]), BatchOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        h.engine.retry(running).await,
        Err(BatchError::NotTerminal { status: JobStatus::Processing, .. })
    ));
    h.engine.cancel_job(running).await.unwrap();

    let empty = h
        .engine
        .submit_batch(Vec::new(), BatchOptions::default())
        .await
        .unwrap();
    assert!(matches!(
        h.engine.retry(empty).await,
        Err(BatchError::NothingToRetry(id)) if id == empty
    ));
}

#[tokio::test]
async fn test_recover_dispatches_only_unsettled_images() {
    let h = default_harness();

    // A job interrupted mid-run: one of three images already settled.
    let mut job = BatchVerificationJob::new(
        uuid::Uuid::new_v4(),
        ids(&["a", "b", "c"]),
        BatchOptions::default(),
        None,
    );
    job.mark_processing();
    h.store.create(&job).await.unwrap();
    let settled = veriframe_core::ItemVerifier::new(
        h.ledger.clone(),
        h.detector.clone(),
        Duration::from_secs(1),
    )
    .verify(&ImageRef::new("a", "https://images.test/a"), false)
    .await;
    job.record_result(settled);
    h.store.update(&job).await.unwrap();
    let calls_before = h.ledger.probe().calls();

    assert_eq!(h.engine.recover().await.unwrap(), 1);
    let recovered = h.engine.wait_for_terminal(job.id, WAIT).await.unwrap();

    assert_eq!(recovered.status, JobStatus::Completed);
    assert_eq!(recovered.completed_images, 3);
    assert_eq!(h.ledger.probe().calls() - calls_before, 2);
    assert_eq!(recovered.results["a"], job.results["a"]);
}

#[tokio::test]
async fn test_resume_terminal_job_rejected() {
    let h = default_harness();
    let job_id = h
        .engine
        .submit_batch(ids(&["a"]), BatchOptions::default())
        .await
        .unwrap();
    h.engine.wait_for_terminal(job_id, WAIT).await.unwrap();

    assert!(matches!(
        h.engine.resume(job_id).await,
        Err(BatchError::AlreadyTerminal { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_job_resumable() {
    let h = harness(
        EngineConfig::default().with_max_concurrency(1),
        MockIntegrityLookup::new().with_latency(Duration::from_millis(50)),
        MockDetector::new(),
    );
    let job_id = h
        .engine
        .submit_batch(numbered(10), BatchOptions::default())
        .await
        .unwrap();
    wait_for_completed_images(&h.engine, job_id, 1).await;
    h.engine.shutdown().await;

    let interrupted = h.store.get(job_id).await.unwrap().unwrap();
    assert_eq!(interrupted.status, JobStatus::Processing);
    assert!(interrupted.completed_images < 10);
    assert!(interrupted.error.is_none());

    let restarted = BatchVerificationEngine::new(
        EngineConfig::default(),
        h.store.clone(),
        h.ledger.clone(),
        h.detector.clone(),
        Arc::new(UrlImageSource::new("https://images.test")),
    );
    assert_eq!(restarted.recover().await.unwrap(), 1);
    let job = restarted.wait_for_terminal(job_id, WAIT).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_images, 10);
}

#[tokio::test]
async fn test_listing_is_newest_first() {
    let h = default_harness();
    let first = h
        .engine
        .submit_batch(ids(&["a"]), BatchOptions::default())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = h
        .engine
        .submit_batch(ids(&["b"]), BatchOptions::default())
        .await
        .unwrap();
    h.engine.wait_for_terminal(first, WAIT).await.unwrap();
    h.engine.wait_for_terminal(second, WAIT).await.unwrap();

    let page = h.engine.list_jobs(&JobListParams::default()).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.jobs[0].id, second);
    assert_eq!(page.jobs[1].id, first);
    assert!(!page.has_more);
}
