use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use metrics::{counter, gauge};
use thiserror::Error;
use tokio::{
    sync::{Semaphore, mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tracing::{info, warn};
use uuid::Uuid;

use super::{METRIC_JOBS_INFLIGHT, METRIC_QUEUE_REJECTED, pipeline::JobProcessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfTask {
    pub job_id: Uuid,
    pub quote_id: Uuid,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("pdf job queue is full")]
    Full,
    #[error("pdf job queue is closed")]
    Closed,
}

/// Tasks accepted by the pool that have not recorded a terminal status yet.
#[derive(Clone, Default)]
struct Outstanding {
    tasks: Arc<Mutex<HashMap<Uuid, Uuid>>>,
}

impl Outstanding {
    fn insert(&self, task: PdfTask) {
        self.lock().insert(task.job_id, task.quote_id);
    }

    fn remove(&self, job_id: Uuid) {
        self.lock().remove(&job_id);
    }

    fn drain(&self) -> Vec<PdfTask> {
        self.lock()
            .drain()
            .map(|(job_id, quote_id)| PdfTask { job_id, quote_id })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Uuid>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable submission side of the worker pool.
#[derive(Clone)]
pub struct PdfJobQueue {
    sender: mpsc::Sender<PdfTask>,
    outstanding: Outstanding,
}

impl PdfJobQueue {
    /// Never waits; a saturated pool rejects the task.
    pub fn try_enqueue(&self, task: PdfTask) -> Result<(), EnqueueError> {
        self.outstanding.insert(task);
        self.sender.try_send(task).map_err(|err| {
            self.outstanding.remove(task.job_id);
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
                mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
            };
            counter!(METRIC_QUEUE_REJECTED, "reason" => match reason {
                EnqueueError::Full => "full",
                EnqueueError::Closed => "closed",
            })
            .increment(1);
            reason
        })
    }
}

/// Bounded pool processing detached jobs with at most `concurrency` in flight.
pub struct PdfWorkerPool {
    queue: PdfJobQueue,
    processor: Arc<JobProcessor>,
    shutdown: Option<oneshot::Sender<()>>,
    dispatcher: JoinHandle<()>,
}

impl PdfWorkerPool {
    pub fn start(processor: Arc<JobProcessor>, concurrency: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let outstanding = Outstanding::default();
        let dispatcher = tokio::spawn(dispatch(
            Arc::clone(&processor),
            receiver,
            semaphore,
            outstanding.clone(),
            shutdown_rx,
        ));

        info!(
            target: "quotepdf::jobs::worker",
            concurrency, capacity, "pdf worker pool started"
        );

        Self {
            queue: PdfJobQueue {
                sender,
                outstanding,
            },
            processor,
            shutdown: Some(shutdown_tx),
            dispatcher,
        }
    }

    pub fn queue(&self) -> PdfJobQueue {
        self.queue.clone()
    }

    /// Stop accepting work, then finish queued and running jobs within `grace`.
    ///
    /// Jobs still queued or running when `grace` expires are cancelled and
    /// recorded as failed at stage `shutdown`.
    pub async fn shutdown(mut self, grace: Duration) {
        if let Some(signal) = self.shutdown.take() {
            let _ = signal.send(());
        }
        if tokio::time::timeout(grace, &mut self.dispatcher).await.is_ok() {
            info!(target: "quotepdf::jobs::worker", "pdf worker pool drained");
            return;
        }

        self.dispatcher.abort();
        // Dropping the dispatcher's JoinSet cancels the running jobs.
        let _ = (&mut self.dispatcher).await;

        let abandoned = self.queue.outstanding.drain();
        warn!(
            target: "quotepdf::jobs::worker",
            grace_ms = grace.as_millis() as u64,
            abandoned = abandoned.len(),
            "pdf worker pool did not drain before the deadline"
        );
        for task in abandoned {
            self.processor
                .reject(task.job_id, task.quote_id, "shutdown")
                .await;
        }
    }
}

async fn dispatch(
    processor: Arc<JobProcessor>,
    mut receiver: mpsc::Receiver<PdfTask>,
    semaphore: Arc<Semaphore>,
    outstanding: Outstanding,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut inflight = JoinSet::new();
    let mut closing = false;

    loop {
        let task = if closing {
            receiver.recv().await
        } else {
            tokio::select! {
                task = receiver.recv() => task,
                _ = &mut shutdown => {
                    closing = true;
                    receiver.close();
                    continue;
                }
            }
        };
        let Some(task) = task else { break };

        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let processor = Arc::clone(&processor);
        let outstanding = outstanding.clone();
        gauge!(METRIC_JOBS_INFLIGHT).increment(1.0);
        inflight.spawn(async move {
            let _permit = permit;
            processor.run(task.job_id, task.quote_id).await;
            outstanding.remove(task.job_id);
            gauge!(METRIC_JOBS_INFLIGHT).decrement(1.0);
        });

        while inflight.try_join_next().is_some() {}
    }

    while inflight.join_next().await.is_some() {}
}
