//! Worker pool for per-tick fan-out
//!
//! A fixed set of named std threads pull boxed jobs from a shared crossbeam
//! channel. The engine uses the pool for per-channel quality assessment and
//! for running every gate on the same window in parallel mode.
//!
//! # Fan-out / join
//!
//! [`WorkerPool::map`] submits one job per item and blocks until every
//! result is back, which acts as the tick's barrier. Each job runs under
//! `catch_unwind`: a panicking job becomes a [`EngineError::WorkerPool`]
//! for that call while the worker thread keeps serving the queue.

use crate::error::{EngineError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` worker threads (at least one)
    pub fn new(size: usize) -> Result<Self> {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let rx: Receiver<Job> = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("venturi-worker-{}", index))
                .spawn(move || {
                    tracing::debug!("Worker {} started", index);
                    for job in rx.iter() {
                        job();
                    }
                    tracing::debug!("Worker {} stopped", index);
                })
                .map_err(|e| EngineError::WorkerPool(format!("failed to spawn worker: {}", e)))?;
            workers.push(handle);
        }

        tracing::info!("Worker pool started with {} threads", size);
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Apply `f` to every item on the pool and collect results in input order.
    ///
    /// Blocks until all jobs have finished. Fails if any job panicked.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Result<Vec<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let n = items.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let f = Arc::new(f);
        let (tx, rx) = bounded::<(usize, std::result::Result<R, String>)>(n);
        for (index, item) in items.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let tx = tx.clone();
            self.submit(Box::new(move || {
                let result = catch_unwind(AssertUnwindSafe(|| f(item)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                let _ = tx.send((index, result));
            }))?;
        }
        drop(tx);

        let mut slots: Vec<Option<R>> = (0..n).map(|_| None).collect();
        let mut failure = None;
        for _ in 0..n {
            let (index, result) = rx
                .recv()
                .map_err(|_| EngineError::WorkerPool("worker disconnected mid-job".into()))?;
            match result {
                Ok(value) => slots[index] = Some(value),
                Err(msg) => {
                    tracing::error!("Worker job {} panicked: {}", index, msg);
                    failure.get_or_insert(msg);
                }
            }
        }
        if let Some(msg) = failure {
            return Err(EngineError::WorkerPool(format!("job panicked: {}", msg)));
        }

        slots
            .into_iter()
            .map(|slot| slot.ok_or_else(|| EngineError::WorkerPool("missing job result".into())))
            .collect()
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .as_ref()
            .ok_or_else(|| EngineError::WorkerPool("pool is shut down".into()))?
            .send(job)
            .map_err(|_| EngineError::WorkerPool("pool is shut down".into()))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue ends every worker loop.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Worker thread panicked during shutdown");
            }
        }
        tracing::debug!("Worker pool stopped");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_map_preserves_order() {
        let pool = WorkerPool::new(4).unwrap();
        let out = pool.map((0..32).collect(), |x: i32| x * x).unwrap();
        assert_eq!(out, (0..32).map(|x| x * x).collect::<Vec<_>>());
    }

    #[test]
    fn test_map_empty() {
        let pool = WorkerPool::new(1).unwrap();
        let out: Vec<i32> = pool.map(Vec::<i32>::new(), |x| x).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_panicking_job_is_reported_and_pool_survives() {
        let pool = WorkerPool::new(2).unwrap();
        let err = pool
            .map(vec![1, 2, 3], |x: i32| {
                if x == 2 {
                    panic!("boom");
                }
                x
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::WorkerPool(ref m) if m.contains("boom")));

        let out = pool.map(vec![5, 6], |x: i32| x + 1).unwrap();
        assert_eq!(out, vec![6, 7]);
    }

    #[test]
    fn test_map_runs_every_job_and_drop_joins() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(3).unwrap();
            assert_eq!(pool.size(), 3);
            let c = Arc::clone(&counter);
            pool.map((0..10).collect(), move |_: i32| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(Arc::strong_count(&counter), 1);
    }
}
