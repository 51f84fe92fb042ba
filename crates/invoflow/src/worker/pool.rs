use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::{Pipeline, PipelineConfig, TaskResult};
use crate::queue::{JobQueue, TaskKind};

/// `worker_count` tokio tasks per stage, each claiming and running one task
/// at a time.
pub struct WorkerPool {
    result_receiver: mpsc::Receiver<TaskResult>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    queue: JobQueue,
}

impl WorkerPool {
    /// Spawns the workers on the current tokio runtime.
    pub fn start(pipeline: Arc<Pipeline>, config: &PipelineConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let (result_sender, result_receiver) = mpsc::channel::<TaskResult>(worker_count * 4);
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = pipeline.context().queue().clone();

        let mut workers = Vec::with_capacity(worker_count * 2);
        for kind in [TaskKind::Extract, TaskKind::Rename] {
            for worker_id in 0..worker_count {
                let worker = Worker {
                    id: worker_id,
                    kind,
                    pipeline: Arc::clone(&pipeline),
                    results: result_sender.clone(),
                    shutdown: Arc::clone(&shutdown),
                    idle_poll: config.idle_poll,
                };
                workers.push(tokio::spawn(worker.run()));
            }
        }

        info!("Started {} workers per stage", worker_count);

        Self {
            result_receiver,
            workers,
            shutdown,
            queue,
        }
    }

    pub fn try_recv_result(&mut self) -> Option<TaskResult> {
        self.result_receiver.try_recv().ok()
    }

    /// Next task result. `None` once every worker has stopped.
    pub async fn recv_result(&mut self) -> Option<TaskResult> {
        self.result_receiver.recv().await
    }

    /// Asks workers to stop after their current task.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
        self.queue.wake_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Waits for every worker to stop.
    pub async fn wait(self) {
        let results = futures_util::future::join_all(self.workers).await;
        for (i, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

struct Worker {
    id: usize,
    kind: TaskKind,
    pipeline: Arc<Pipeline>,
    results: mpsc::Sender<TaskResult>,
    shutdown: Arc<AtomicBool>,
    idle_poll: Duration,
}

impl Worker {
    async fn run(self) {
        debug!("{} worker {} started", self.kind, self.id);
        let queue = self.pipeline.context().queue().clone();

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.pipeline.run_next(self.kind).await {
                Ok(Some(result)) => {
                    // a full channel means nobody is reading results
                    if let Err(mpsc::error::TrySendError::Closed(_)) = self.results.try_send(result) {
                        debug!("{} worker {} result receiver dropped", self.kind, self.id);
                    }
                }
                Ok(None) => queue.wait_for_work(self.idle_poll).await,
                Err(e) => {
                    error!("{} worker {} failed to claim a task: {}", self.kind, self.id, e);
                    queue.wait_for_work(self.idle_poll).await;
                }
            }
        }

        debug!("{} worker {} stopped", self.kind, self.id);
    }
}
