// THEORY:
// `ParallelPipeline` runs the same two phases as `VisionPipeline` on a bounded
// worker pool, with a join barrier after each phase.
//
// Phase 1: the coordinator walks the background chain in frame order. As soon as
// the background preceding frame i is known, frame i's detection job is queued, so
// detection of early frames overlaps with computing later backgrounds. Every job
// writes only its own slot.
//
// Phase 2: association runs once, centrally, over the now-immutable candidate lists.
// Each resulting track becomes one render job; render jobs contend only on output
// frames, and the store serializes those writes with a lock per frame.
//
// The pool never grows with the amount of work: `worker_pool_size` workers pull from
// bounded queues and run each job on tokio's blocking pool, one at a time.
//
// `join_timeout_ms` bounds each phase as a whole (submission, the background chain,
// association and the barrier). A run that fails or times out aborts the pool
// instead of draining it, so queued jobs never start and the error is returned at
// once. A job already running on the blocking pool finishes in the background and
// its result is discarded.

use crate::core_modules::frame_processor::FrameProcessor;
use crate::core_modules::renderer;
use crate::core_modules::sequence_store::SequenceStore;
use crate::core_modules::tracker::{Track, Tracker};
use crate::error::{Result, VisionError};
use crate::pipeline::{PipelineConfig, Report};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const QUEUE_DEPTH_PER_WORKER: usize = 2;

type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

pub struct PoolTask {
    job: Job,
    result_sender: oneshot::Sender<Result<()>>,
}

/// Receives the outcome of one submitted job.
pub type TaskHandle = oneshot::Receiver<Result<()>>;

pub struct WorkerPool {
    task_sender: mpsc::Sender<PoolTask>,
    dispatcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `size` workers and a round-robin dispatcher. Must be called inside a
    /// tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (task_sender, mut task_receiver) = mpsc::channel::<PoolTask>(size * QUEUE_DEPTH_PER_WORKER);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..size)
            .map(|_| mpsc::channel::<PoolTask>(QUEUE_DEPTH_PER_WORKER))
            .unzip();

        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if worker_senders[worker_idx].send(task).await.is_err() {
                    break;
                }
                worker_idx = (worker_idx + 1) % worker_senders.len();
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_id, mut worker_receiver)| {
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let outcome = match tokio::task::spawn_blocking(task.job).await {
                            Ok(result) => result,
                            Err(join_error) => Err(VisionError::TaskFailed(format!(
                                "worker {worker_id}: {join_error}"
                            ))),
                        };
                        let _ = task.result_sender.send(outcome);
                    }
                })
            })
            .collect();

        tracing::debug!(workers = size, "worker pool started");
        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    /// Queues a job. Waits while the queue is full.
    pub async fn submit<F>(&self, job: F) -> Result<TaskHandle>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let (result_sender, result_receiver) = oneshot::channel();
        let task = PoolTask {
            job: Box::new(job),
            result_sender,
        };
        self.task_sender
            .send(task)
            .await
            .map_err(|_| VisionError::TaskFailed("worker pool is shut down".to_string()))?;
        Ok(result_receiver)
    }

    /// Closes the queue and waits for every worker to drain.
    pub async fn shutdown(self) {
        drop(self.task_sender);
        let _ = self.dispatcher.await;
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// Stops the dispatcher and every worker without draining the queues.
    pub fn abort(self) {
        self.dispatcher.abort();
        for worker in &self.workers {
            worker.abort();
        }
    }
}

/// Runs `phase` under an optional deadline.
pub async fn within<T>(limit: Option<Duration>, phase: impl Future<Output = Result<T>>) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, phase).await.map_err(|_| {
            tracing::warn!(?limit, "phase timed out");
            VisionError::TaskTimedOut(limit)
        })?,
        None => phase.await,
    }
}

/// Drops the handles of finished jobs and fails with the first error among them.
fn reap_finished(pending: &mut Vec<TaskHandle>) -> Result<()> {
    let mut failure = None;
    pending.retain_mut(|handle| match handle.try_recv() {
        Ok(Ok(())) => false,
        Ok(Err(error)) => {
            failure.get_or_insert(error);
            false
        }
        Err(oneshot::error::TryRecvError::Empty) => true,
        Err(oneshot::error::TryRecvError::Closed) => {
            failure.get_or_insert(VisionError::TaskFailed("worker dropped its result".to_string()));
            false
        }
    });
    failure.map_or(Ok(()), Err)
}

/// Join barrier: waits for every handle and fails with the first error, or with
/// `TaskTimedOut` when `timeout` elapses first.
pub async fn join_tasks(handles: Vec<TaskHandle>, timeout: Option<Duration>) -> Result<()> {
    let outcomes = within(timeout, async { Ok(futures::future::join_all(handles).await) }).await?;
    for outcome in outcomes {
        outcome.map_err(|_| VisionError::TaskFailed("worker dropped its result".to_string()))??;
    }
    Ok(())
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|join_error| VisionError::TaskFailed(join_error.to_string()))?
}

pub struct ParallelPipeline {
    config: PipelineConfig,
    processor: Arc<FrameProcessor>,
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            processor: Arc::new(FrameProcessor::new(config.clone())),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs detection and tracking over the whole store. On success every output
    /// frame is fully annotated.
    pub async fn run(&self, store: Arc<SequenceStore>) -> Result<Report> {
        let pool = WorkerPool::new(self.config.worker_pool_size);
        match self.run_phases(&pool, &store).await {
            Ok(report) => {
                pool.shutdown().await;
                Ok(report)
            }
            Err(error) => {
                tracing::warn!(%error, "run aborted");
                pool.abort();
                Err(error)
            }
        }
    }

    async fn run_phases(&self, pool: &WorkerPool, store: &Arc<SequenceStore>) -> Result<Report> {
        tracing::info!(
            frames = store.len(),
            workers = self.config.worker_pool_size,
            "detection phase started"
        );
        let limit = self.config.join_timeout();
        within(limit, self.detect(pool, store)).await?;

        let tracks = {
            let store = Arc::clone(store);
            let config = self.config.clone();
            within(limit, blocking(move || Tracker::associate(&store, &config))).await?
        };

        tracing::info!(tracks = tracks.len(), "tracking phase started");
        within(limit, self.render(pool, store, &tracks)).await?;
        Report::build(store, &tracks)
    }

    async fn detect(&self, pool: &WorkerPool, store: &Arc<SequenceStore>) -> Result<()> {
        let mut background = Arc::new(store.background().clone());
        let mut pending = Vec::with_capacity(store.len());

        for index in store.indices() {
            reap_finished(&mut pending)?;
            let processor = Arc::clone(&self.processor);
            let job_store = Arc::clone(store);
            let job_background = Arc::clone(&background);
            pending.push(
                pool.submit(move || {
                    processor
                        .process_slot(&job_store, index, &job_background)
                        .map(|_| ())
                })
                .await?,
            );

            let processor = Arc::clone(&self.processor);
            let chain_store = Arc::clone(store);
            let previous = background;
            background = Arc::new(
                blocking(move || processor.next_background(&previous, chain_store.raw(index)?)).await?,
            );
        }

        join_tasks(pending, None).await?;
        store.ensure_complete()
    }

    async fn render(&self, pool: &WorkerPool, store: &Arc<SequenceStore>, tracks: &[Track]) -> Result<()> {
        let mut pending = Vec::with_capacity(tracks.len());
        for track in tracks {
            reap_finished(&mut pending)?;
            let track = track.clone();
            let job_store = Arc::clone(store);
            pending.push(pool.submit(move || renderer::render_track(&job_store, &track)).await?);
        }
        join_tasks(pending, None).await
    }
}
