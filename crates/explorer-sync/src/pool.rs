//! Fixed-size worker pool for independent units of work.
//!
//! `workers` tokio tasks pull jobs from a shared queue and run each one to
//! completion. Every submission gets exactly one [`WorkResult`] back through
//! its [`JobHandle`]; a job that fails or panics only affects its own result.
//! Completion order across jobs is unspecified.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A schedulable unit of work with typed input (the implementor itself) and
/// typed output.
#[async_trait]
pub trait WorkUnit: Send + 'static {
    type Output: Send + 'static;
    type Error: Send + 'static;

    /// Runs the job. `cancel` is cancelled when the pool is cancelled.
    async fn execute(self, cancel: CancellationToken) -> Result<Self::Output, Self::Error>;
}

/// Why a submission produced no value.
#[derive(Debug, thiserror::Error)]
pub enum WorkError<E> {
    #[error("job failed: {0}")]
    Failed(E),

    #[error("job panicked: {0}")]
    Panicked(String),

    /// The pool shut down or was cancelled before the job ran.
    #[error("job cancelled before completion")]
    Cancelled,
}

pub type WorkResult<O, E> = Result<O, WorkError<E>>;

/// Receives the result of one submission.
pub struct JobHandle<O, E> {
    rx: oneshot::Receiver<WorkResult<O, E>>,
}

impl<O, E> JobHandle<O, E> {
    /// Waits for the job's result.
    pub async fn join(self) -> WorkResult<O, E> {
        self.rx.await.unwrap_or(Err(WorkError::Cancelled))
    }
}

struct Envelope<J: WorkUnit> {
    job: J,
    reply: oneshot::Sender<WorkResult<J::Output, J::Error>>,
}

pub struct WorkerPool<J: WorkUnit> {
    queue: async_channel::Sender<Envelope<J>>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<J: WorkUnit> WorkerPool<J> {
    /// Starts `workers` executors (at least one) over an unbounded queue.
    pub fn new(workers: usize) -> Self {
        Self::with_cancellation(workers, None, CancellationToken::new())
    }

    /// Starts `workers` executors over a queue holding at most `capacity`
    /// pending jobs; `submit` waits while the queue is full.
    pub fn bounded(workers: usize, capacity: usize) -> Self {
        Self::with_cancellation(workers, Some(capacity), CancellationToken::new())
    }

    /// Starts a pool whose jobs are cancelled together with `cancel`.
    pub fn with_cancellation(
        workers: usize,
        capacity: Option<usize>,
        cancel: CancellationToken,
    ) -> Self {
        let (queue, rx) = match capacity {
            Some(capacity) => async_channel::bounded(capacity.max(1)),
            None => async_channel::unbounded(),
        };
        let workers = (0..workers.max(1))
            .map(|id| tokio::spawn(worker_loop(id, rx.clone(), cancel.clone())))
            .collect();

        Self {
            queue,
            workers,
            cancel,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues `job`. The handle resolves to [`WorkError::Cancelled`] if the
    /// pool is closed before the job runs.
    pub async fn submit(&self, job: J) -> JobHandle<J::Output, J::Error> {
        let (reply, rx) = oneshot::channel();
        if self.queue.send(Envelope { job, reply }).await.is_err() {
            tracing::warn!("submitted to a closed worker pool");
        }
        JobHandle { rx }
    }

    /// Signals every running job and fails every queued one.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting jobs, lets queued jobs drain and waits for the workers.
    pub async fn shutdown(self) {
        self.queue.close();
        for worker in self.workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "worker task join error");
            }
        }
    }
}

async fn worker_loop<J: WorkUnit>(
    id: usize,
    queue: async_channel::Receiver<Envelope<J>>,
    cancel: CancellationToken,
) {
    while let Ok(Envelope { job, reply }) = queue.recv().await {
        if cancel.is_cancelled() {
            let _ = reply.send(Err(WorkError::Cancelled));
            continue;
        }

        let outcome = AssertUnwindSafe(job.execute(cancel.child_token()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(WorkError::Failed(err)),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(worker = id, panic = %message, "job panicked");
                Err(WorkError::Panicked(message))
            }
        };

        if reply.send(result).is_err() {
            tracing::debug!(worker = id, "job handle dropped before result");
        }
    }
    tracing::trace!(worker = id, "worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    enum Behaviour {
        Succeed(u64),
        Fail,
        Panic,
    }

    struct TestJob {
        behaviour: Behaviour,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkUnit for TestJob {
        type Output = u64;
        type Error = String;

        async fn execute(self, _cancel: CancellationToken) -> Result<u64, String> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed(n) => Ok(n * 2),
                Behaviour::Fail => Err("bad input".to_string()),
                Behaviour::Panic => panic!("job exploded"),
            }
        }
    }

    fn jobs(behaviours: Vec<Behaviour>) -> (Vec<TestJob>, Arc<AtomicUsize>) {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs = behaviours
            .into_iter()
            .map(|behaviour| TestJob {
                behaviour,
                running: running.clone(),
                peak: peak.clone(),
            })
            .collect();
        (jobs, peak)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failure_and_panic_stay_isolated() {
        for workers in [1, 2, 8] {
            let (jobs, _) = jobs(vec![
                Behaviour::Succeed(1),
                Behaviour::Fail,
                Behaviour::Succeed(2),
                Behaviour::Panic,
                Behaviour::Succeed(3),
            ]);
            let pool = WorkerPool::new(workers);
            let mut handles = Vec::new();
            for job in jobs {
                handles.push(pool.submit(job).await);
            }

            let mut results = Vec::new();
            for handle in handles {
                results.push(handle.join().await);
            }

            assert_eq!(results.len(), 5, "workers = {workers}");
            assert_eq!(results[0].as_ref().ok(), Some(&2));
            assert!(matches!(results[1], Err(WorkError::Failed(ref e)) if e == "bad input"));
            assert_eq!(results[2].as_ref().ok(), Some(&4));
            assert!(matches!(results[3], Err(WorkError::Panicked(ref m)) if m == "job exploded"));
            assert_eq!(results[4].as_ref().ok(), Some(&6));

            pool.shutdown().await;
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_worker_count() {
        let (jobs, peak) = jobs((0..12).map(Behaviour::Succeed).collect());
        let pool = WorkerPool::bounded(3, 2);
        let mut handles = Vec::new();
        for job in jobs {
            handles.push(pool.submit(job).await);
        }
        for handle in handles {
            handle.join().await.expect("job should succeed");
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.worker_count(), 3);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn cancelled_pool_fails_queued_jobs() {
        let (jobs, _) = jobs(vec![Behaviour::Succeed(1)]);
        let pool = WorkerPool::new(1);
        pool.cancel();
        let handle = pool.submit(jobs.into_iter().next().unwrap()).await;
        assert!(matches!(handle.join().await, Err(WorkError::Cancelled)));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn zero_workers_still_runs_jobs() {
        let (jobs, _) = jobs(vec![Behaviour::Succeed(5)]);
        let pool = WorkerPool::new(0);
        assert_eq!(pool.worker_count(), 1);
        let handle = pool.submit(jobs.into_iter().next().unwrap()).await;
        assert_eq!(handle.join().await.ok(), Some(10));
        pool.shutdown().await;
    }
}
