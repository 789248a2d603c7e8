//! Fan-out of a job's images to bounded verification workers.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::coordinator::JobEvent;
use crate::image::ImageSource;
use crate::job::BatchOptions;
use crate::verifier::ItemVerifier;

pub(crate) struct Dispatch {
    pub job_id: Uuid,
    pub image_ids: Vec<String>,
    pub options: BatchOptions,
    pub max_concurrency: usize,
}

impl Dispatch {
    /// Resolve the images and verify them, at most `max_concurrency` at a time.
    ///
    /// Stops handing out work once `cancel` fires; items already started run to
    /// completion. Returns after every started worker has finished.
    pub(crate) async fn run(
        self,
        images: Arc<dyn ImageSource>,
        verifier: Arc<ItemVerifier>,
        cancel: CancellationToken,
        events: mpsc::Sender<JobEvent>,
    ) {
        let refs = match images.resolve(&self.image_ids).await {
            Ok(refs) if refs.len() == self.image_ids.len() => refs,
            Ok(refs) => {
                let reason = format!(
                    "Image source returned {} references for {} images",
                    refs.len(),
                    self.image_ids.len()
                );
                let _ = events.send(JobEvent::Aborted(reason)).await;
                return;
            }
            Err(e) => {
                let _ = events
                    .send(JobEvent::Aborted(format!("Failed to load images: {e}")))
                    .await;
                return;
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency.max(1)));
        let run_detection = self.options.run_detection_analysis;
        let mut workers = JoinSet::new();

        for image in refs {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let verifier = verifier.clone();
            let events = events.clone();
            workers.spawn(async move {
                let _permit = permit;
                let result = verifier.verify(&image, run_detection).await;
                // The coordinator may already be gone if the job went terminal.
                let _ = events.send(JobEvent::ItemSettled(result)).await;
            });
        }

        if cancel.is_cancelled() {
            debug!(job_id = %self.job_id, started = workers.len(), "Dispatch stopped by cancellation");
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(job_id = %self.job_id, error = %e, "Verification worker crashed");
                let _ = events
                    .send(JobEvent::Aborted(format!("Verification worker crashed: {e}")))
                    .await;
            }
        }
    }
}
