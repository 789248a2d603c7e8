//! Batch verification engine.
//!
//! Accepts batches of image ids, verifies them concurrently and keeps the job
//! store current. Each running job has exactly one coordinator task that owns
//! the job record; workers only report results to it over a channel.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use veriframe_core::{
//!     BatchOptions, BatchVerificationEngine, EngineConfig, MemoryJobStore, MockDetector,
//!     MockIntegrityLookup, UrlImageSource,
//! };
//!
//! # async fn example() -> veriframe_core::Result<()> {
//! let ledger = Arc::new(MockIntegrityLookup::new());
//! ledger.register("img-1", b"pixels");
//!
//! let engine = BatchVerificationEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemoryJobStore::new()),
//!     ledger,
//!     Arc::new(MockDetector::new()),
//!     Arc::new(UrlImageSource::new("https://images.example.com")),
//! );
//!
//! let job_id = engine
//!     .submit_batch(vec!["img-1".into()], BatchOptions::default())
//!     .await?;
//! let job = engine.wait_for_terminal(job_id, Duration::from_secs(5)).await?;
//! assert!(job.results["img-1"].verified);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod dispatch;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::detection::ManipulationDetector;
use crate::error::{BatchError, Result, StoreError};
use crate::image::ImageSource;
use crate::integrity::IntegrityLookup;
use crate::job::{BatchOptions, BatchVerificationJob, JobStatus};
use crate::store::{JobListPage, JobListParams, JobStore};
use crate::verifier::ItemVerifier;

use coordinator::{Coordinator, JobEvent};
use dispatch::Dispatch;

/// Capacity of each job's event channel.
const EVENT_BUFFER: usize = 64;

/// Store polling interval for [`BatchVerificationEngine::wait_for_terminal`].
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A batch submission.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub image_ids: Vec<String>,
    pub options: BatchOptions,
    /// Caller-chosen job id; generated when absent
    pub job_id: Option<Uuid>,
    pub owner_id: Option<String>,
}

impl SubmitRequest {
    pub fn new(image_ids: Vec<String>, options: BatchOptions) -> Self {
        Self {
            image_ids,
            options,
            ..Default::default()
        }
    }

    pub fn with_job_id(mut self, job_id: Uuid) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_owner(mut self, owner_id: Option<String>) -> Self {
        self.owner_id = owner_id;
        self
    }
}

/// Handle on a running job held by the engine.
///
/// A slot whose sender can no longer be upgraded belongs to a coordinator that
/// is exiting, or to a cancel of an orphaned job in progress.
#[derive(Clone)]
struct ActiveJob {
    cancel: CancellationToken,
    events: mpsc::WeakSender<JobEvent>,
}

/// Exclusive hold on a job's `active` slot, with the channel its coordinator
/// will read.
struct Claim {
    cancel: CancellationToken,
    events: mpsc::Sender<JobEvent>,
    receiver: mpsc::Receiver<JobEvent>,
}

struct Inner {
    config: EngineConfig,
    store: Arc<dyn JobStore>,
    verifier: Arc<ItemVerifier>,
    images: Arc<dyn ImageSource>,
    active: DashMap<Uuid, ActiveJob>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Cheap to clone; clones share the same jobs.
#[derive(Clone)]
pub struct BatchVerificationEngine {
    inner: Arc<Inner>,
}

impl BatchVerificationEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        integrity: Arc<dyn IntegrityLookup>,
        detector: Arc<dyn ManipulationDetector>,
        images: Arc<dyn ImageSource>,
    ) -> Self {
        let verifier = Arc::new(ItemVerifier::new(integrity, detector, config.item_timeout));
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                verifier,
                images,
                active: DashMap::new(),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.inner.store
    }

    /// Number of jobs with a live coordinator.
    pub fn active_jobs(&self) -> usize {
        self.inner.active.len()
    }

    /// Submit `image_ids` under a fresh job id.
    pub async fn submit_batch(&self, image_ids: Vec<String>, options: BatchOptions) -> Result<Uuid> {
        self.submit(SubmitRequest::new(image_ids, options)).await
    }

    /// Validate, persist and start a batch. Returns once the job is `processing`
    /// (or already `completed` for an empty batch).
    pub async fn submit(&self, request: SubmitRequest) -> Result<Uuid> {
        validate_image_ids(&request.image_ids, self.inner.config.max_batch_size)?;
        let job_id = request.job_id.unwrap_or_else(Uuid::new_v4);
        let job = BatchVerificationJob::new(
            job_id,
            request.image_ids,
            request.options,
            request.owner_id,
        );
        self.create_and_launch(job).await
    }

    async fn create_and_launch(&self, job: BatchVerificationJob) -> Result<Uuid> {
        let job_id = job.id;
        // Claimed before the record exists: a cancel that can read the record
        // always finds this slot.
        let claim = self.claim(job_id).ok_or(BatchError::DuplicateJob(job_id))?;
        if let Err(e) = self.create(&job).await {
            self.release(job_id);
            return Err(e);
        }

        info!(
            %job_id,
            total = job.total_images,
            detection = job.options.run_detection_analysis,
            retry_of = ?job.retry_of,
            "Batch submitted"
        );
        self.launch(job, claim).await?;
        Ok(job_id)
    }

    async fn create(&self, job: &BatchVerificationJob) -> Result<()> {
        if self.inner.store.get(job.id).await?.is_some() {
            return Err(BatchError::DuplicateJob(job.id));
        }
        self.inner.store.create(job).await.map_err(|e| match e {
            StoreError::Conflict(id) => BatchError::DuplicateJob(id),
            other => BatchError::Store(other),
        })
    }

    /// Take the `active` slot for `job_id`, or `None` if someone holds it.
    fn claim(&self, job_id: Uuid) -> Option<Claim> {
        match self.inner.active.entry(job_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let cancel = self.inner.shutdown.child_token();
                let (events, receiver) = mpsc::channel(EVENT_BUFFER);
                slot.insert(ActiveJob {
                    cancel: cancel.clone(),
                    events: events.downgrade(),
                });
                Some(Claim {
                    cancel,
                    events,
                    receiver,
                })
            }
        }
    }

    fn release(&self, job_id: Uuid) {
        self.inner.active.remove(&job_id);
    }

    /// Whether a coordinator is running, or about to run, for `job_id`.
    fn is_running(&self, job_id: Uuid) -> bool {
        self.inner
            .active
            .get(&job_id)
            .is_some_and(|active| active.events.upgrade().is_some())
    }

    /// Move `job` to `processing` and start its coordinator and dispatcher for
    /// every image that has no result yet. The caller holds `claim`; it is
    /// released here unless a coordinator takes it over.
    async fn launch(&self, mut job: BatchVerificationJob, claim: Claim) -> Result<()> {
        let Claim {
            cancel,
            events,
            receiver,
        } = claim;
        let pending = job.unsettled_image_ids();
        job.mark_processing();

        let mut snapshot = job.clone();
        if pending.is_empty() {
            snapshot.finish(JobStatus::Completed, None);
        }
        if let Err(e) = self.inner.store.update(&snapshot).await {
            error!(job_id = %job.id, error = %e, "Failed to persist job launch");
            job.finish(
                JobStatus::Failed,
                Some(format!("Failed to persist job state: {e}")),
            );
            if let Err(e) = self.inner.store.update(&job).await {
                warn!(job_id = %job.id, error = %e, "Could not record job failure");
            }
            self.release(job.id);
            return Err(e.into());
        }
        if snapshot.is_terminal() {
            self.release(job.id);
            info!(job_id = %job.id, total = job.total_images, "Job completed");
            return Ok(());
        }

        let span = info_span!("batch_job", job_id = %job.id);
        let dispatch = Dispatch {
            job_id: job.id,
            image_ids: pending,
            options: job.options,
            max_concurrency: self.inner.config.max_concurrency,
        };

        let inner = self.inner.clone();
        let coordinator = Coordinator::new(
            job,
            self.inner.store.clone(),
            cancel.clone(),
            self.inner.shutdown.clone(),
        );
        self.inner.tracker.spawn(
            async move {
                let job = coordinator.run(receiver).await;
                inner.active.remove(&job.id);
            }
            .instrument(span.clone()),
        );

        self.inner.tracker.spawn(
            dispatch
                .run(
                    self.inner.images.clone(),
                    self.inner.verifier.clone(),
                    cancel,
                    events,
                )
                .instrument(span),
        );
        Ok(())
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<BatchVerificationJob> {
        self.inner
            .store
            .get(job_id)
            .await?
            .ok_or(BatchError::NotFound(job_id))
    }

    pub async fn list_jobs(&self, params: &JobListParams) -> Result<JobListPage> {
        Ok(self.inner.store.list(params).await?)
    }

    /// Cancel a `pending` or `processing` job and return its final snapshot.
    ///
    /// Results of images still in flight are discarded once this returns.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<BatchVerificationJob> {
        loop {
            let job = self.get_job(job_id).await?;
            if job.is_terminal() {
                return Err(BatchError::AlreadyTerminal {
                    id: job_id,
                    status: job.status,
                });
            }

            if let Some(job) = self.cancel_running(job_id).await {
                return Ok(job);
            }

            // No coordinator accepted the request: it is exiting, or the job was orphaned.
            self.wait_for_coordinator_exit(job_id).await;
            if let Some(claim) = self.claim(job_id) {
                drop(claim);
                let cancelled = self.cancel_orphan(job_id).await;
                self.release(job_id);
                return cancelled;
            }
        }
    }

    /// Ask the job's coordinator to cancel, returning its acknowledged snapshot.
    async fn cancel_running(&self, job_id: Uuid) -> Option<BatchVerificationJob> {
        let active = self.inner.active.get(&job_id).map(|a| a.value().clone())?;
        // Hold a sender so the channel stays open until the request is queued.
        let events = active.events.upgrade()?;
        active.cancel.cancel();
        let (ack, acked) = oneshot::channel();
        events.send(JobEvent::Cancel(ack)).await.ok()?;
        acked.await.ok()
    }

    /// Cancel a job with no coordinator. The caller holds its slot.
    async fn cancel_orphan(&self, job_id: Uuid) -> Result<BatchVerificationJob> {
        let mut job = self.get_job(job_id).await?;
        if job.is_terminal() {
            return Err(BatchError::AlreadyTerminal {
                id: job_id,
                status: job.status,
            });
        }
        job.finish(JobStatus::Cancelled, None);
        self.inner.store.update(&job).await?;
        info!(%job_id, completed = job.completed_images, "Cancelled job with no running coordinator");
        Ok(job)
    }

    async fn wait_for_coordinator_exit(&self, job_id: Uuid) {
        while self.inner.active.contains_key(&job_id) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Re-attach a non-terminal job that has no running coordinator.
    ///
    /// Only images without a recorded result are dispatched. Resuming a job that
    /// is already running is a no-op.
    pub async fn resume(&self, job_id: Uuid) -> Result<()> {
        loop {
            let job = self.get_job(job_id).await?;
            if job.is_terminal() {
                return Err(BatchError::AlreadyTerminal {
                    id: job_id,
                    status: job.status,
                });
            }

            if let Some(claim) = self.claim(job_id) {
                return self.resume_claimed(job_id, claim).await;
            }
            if self.is_running(job_id) {
                return Ok(());
            }
            self.wait_for_coordinator_exit(job_id).await;
        }
    }

    async fn resume_claimed(&self, job_id: Uuid, claim: Claim) -> Result<()> {
        // Re-read under the claim; a cancel may have finished the job since.
        let job = match self.get_job(job_id).await {
            Ok(job) if job.is_terminal() => {
                self.release(job_id);
                return Err(BatchError::AlreadyTerminal {
                    id: job_id,
                    status: job.status,
                });
            }
            Ok(job) => job,
            Err(e) => {
                self.release(job_id);
                return Err(e);
            }
        };

        info!(
            %job_id,
            completed = job.completed_images,
            total = job.total_images,
            "Resuming job"
        );
        self.launch(job, claim).await
    }

    /// Resume every stored job left `pending` or `processing`. Returns how many were resumed.
    pub async fn recover(&self) -> Result<usize> {
        let unfinished = self.inner.store.list_unfinished().await?;
        let mut resumed = 0;
        for job in unfinished {
            let job_id = job.id;
            match self.resume(job_id).await {
                Ok(()) => resumed += 1,
                Err(e) => warn!(%job_id, error = %e, "Could not resume job"),
            }
        }
        if resumed > 0 {
            info!(resumed, "Recovered unfinished jobs");
        }
        Ok(resumed)
    }

    /// Submit a new job for the images of a terminal job that have no result
    /// or whose result carries an error.
    pub async fn retry(&self, job_id: Uuid) -> Result<Uuid> {
        let original = self.get_job(job_id).await?;
        if !original.is_terminal() {
            return Err(BatchError::NotTerminal {
                id: job_id,
                status: original.status,
            });
        }
        let image_ids = original.retry_candidates();
        if image_ids.is_empty() {
            return Err(BatchError::NothingToRetry(job_id));
        }

        let mut job = BatchVerificationJob::new(
            Uuid::new_v4(),
            image_ids,
            original.options,
            original.owner_id.clone(),
        );
        job.retry_of = Some(job_id);
        self.create_and_launch(job).await
    }

    /// Poll the store until `job_id` is terminal or `timeout` elapses.
    pub async fn wait_for_terminal(
        &self,
        job_id: Uuid,
        timeout: Duration,
    ) -> Result<BatchVerificationJob> {
        tokio::time::timeout(timeout, self.poll_until_terminal(job_id))
            .await
            .map_err(|_| BatchError::WaitTimeout(job_id))?
    }

    async fn poll_until_terminal(&self, job_id: Uuid) -> Result<BatchVerificationJob> {
        loop {
            let job = self.get_job(job_id).await?;
            if job.is_terminal() {
                return Ok(job);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Stop dispatching new images and wait for in-flight work to drain.
    ///
    /// Unfinished jobs stay `processing` in the store for [`Self::recover`].
    pub async fn shutdown(&self) {
        info!(active = self.active_jobs(), "Shutting down batch engine");
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

/// Reject blank ids, repeated ids and oversized batches.
pub fn validate_image_ids(image_ids: &[String], max_batch_size: usize) -> Result<()> {
    if image_ids.len() > max_batch_size {
        return Err(BatchError::InvalidInput(format!(
            "Batch of {} images exceeds the limit of {max_batch_size}",
            image_ids.len()
        )));
    }

    let mut seen = HashSet::with_capacity(image_ids.len());
    for id in image_ids {
        if id.trim().is_empty() {
            return Err(BatchError::InvalidInput(
                "Image ids must not be blank".to_string(),
            ));
        }
        if !seen.insert(id.as_str()) {
            return Err(BatchError::DuplicateImageId(id.clone()));
        }
    }
    Ok(())
}
