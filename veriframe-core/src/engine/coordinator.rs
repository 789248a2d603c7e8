//! Per-job coordinator: the only writer of a running job's record.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::job::{BatchVerificationJob, BatchVerificationResult, JobStatus};
use crate::store::JobStore;

/// Messages applied to a running job, in arrival order.
#[derive(Debug)]
pub(crate) enum JobEvent {
    /// One image finished verification.
    ItemSettled(BatchVerificationResult),
    /// Stop the job; the acknowledgement carries the cancelled snapshot.
    Cancel(oneshot::Sender<BatchVerificationJob>),
    /// Dispatch itself broke; fail the job with this reason.
    Aborted(String),
}

pub(crate) struct Coordinator {
    job: BatchVerificationJob,
    store: Arc<dyn JobStore>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
}

impl Coordinator {
    pub(crate) fn new(
        job: BatchVerificationJob,
        store: Arc<dyn JobStore>,
        cancel: CancellationToken,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            job,
            store,
            cancel,
            shutdown,
        }
    }

    /// Apply events until the job is terminal or every sender is gone.
    ///
    /// The record is persisted after each applied event.
    pub(crate) async fn run(mut self, mut events: mpsc::Receiver<JobEvent>) -> BatchVerificationJob {
        while let Some(event) = events.recv().await {
            match event {
                JobEvent::ItemSettled(result) => {
                    let image_id = result.image_id.clone();
                    let verified = result.verified;
                    if !self.job.record_result(result) {
                        debug!(job_id = %self.job.id, %image_id, "Ignoring result for settled or unknown image");
                        continue;
                    }
                    debug!(
                        job_id = %self.job.id,
                        %image_id,
                        verified,
                        completed = self.job.completed_images,
                        total = self.job.total_images,
                        "Image settled"
                    );
                }
                JobEvent::Cancel(ack) => {
                    self.cancel.cancel();
                    self.job.finish(JobStatus::Cancelled, None);
                    info!(
                        job_id = %self.job.id,
                        completed = self.job.completed_images,
                        total = self.job.total_images,
                        "Job cancelled"
                    );
                    self.persist().await;
                    let _ = ack.send(self.job.clone());
                    break;
                }
                JobEvent::Aborted(reason) => {
                    error!(job_id = %self.job.id, %reason, "Job dispatch aborted");
                    self.cancel.cancel();
                    self.job.finish(JobStatus::Failed, Some(reason));
                }
            }

            if !self.persist().await || self.job.is_terminal() {
                break;
            }
        }

        if !self.job.is_terminal() {
            if self.shutdown.is_cancelled() {
                info!(
                    job_id = %self.job.id,
                    completed = self.job.completed_images,
                    "Shutting down with job unfinished; it will be resumed on recovery"
                );
            } else {
                self.job.finish(
                    JobStatus::Failed,
                    Some("Dispatch ended before every image settled".to_string()),
                );
                self.persist().await;
            }
        }

        self.cancel.cancel();
        if self.job.status == JobStatus::Completed {
            let verified = self.job.results.values().filter(|r| r.verified).count();
            info!(
                job_id = %self.job.id,
                total = self.job.total_images,
                verified,
                "Job completed"
            );
        }
        self.job
    }

    /// Write the current snapshot. A failed write fails the job.
    async fn persist(&mut self) -> bool {
        let Err(e) = self.store.update(&self.job).await else {
            return true;
        };

        error!(job_id = %self.job.id, error = %e, "Failed to persist job state");
        self.cancel.cancel();
        if !self.job.is_terminal() {
            self.job
                .finish(JobStatus::Failed, Some(format!("Failed to persist job state: {e}")));
            if let Err(e) = self.store.update(&self.job).await {
                warn!(job_id = %self.job.id, error = %e, "Could not record job failure");
            }
        }
        false
    }
}
