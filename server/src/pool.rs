//! Fixed-size worker pool fed by a FIFO task queue
//!
//! The acceptor hands each connection to [`WorkerPool::submit`] and moves on;
//! a worker picks the task up when it is free. Workers run one task at a time
//! to completion, so the pool size caps the number of concurrent sessions and
//! extra connections wait in the queue.
//!
//! Shutdown is cooperative. [`WorkerPool::close`] discards everything still
//! queued and tells workers to stop once their current task returns;
//! [`WorkerPool::shutdown`] additionally joins them.

use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

pub const DEFAULT_WORKERS: usize = 10;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,
    #[error("failed to spawn worker {id}")]
    Spawn {
        id: usize,
        #[source]
        source: io::Error,
    },
}

struct Queue {
    tasks: VecDeque<Task>,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` workers. A size of zero is raised to one.
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = if size == 0 {
            warn!("Worker pool size of 0 requested, using 1");
            1
        } else {
            size
        };

        let mut pool = Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    tasks: VecDeque::new(),
                    closed: false,
                }),
                ready: Condvar::new(),
            }),
            workers: Vec::with_capacity(size),
        };

        for id in 0..size {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || run_worker(id, &shared))
                .map_err(|source| PoolError::Spawn { id, source })?;
            pool.workers.push(handle);
        }

        info!("Started worker pool with {} workers", size);
        Ok(pool)
    }

    /// Queues a task and wakes one idle worker. Never blocks on a busy pool.
    pub fn submit<F>(&self, task: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut queue = self.shared.lock();
            if queue.closed {
                return Err(PoolError::ShutDown);
            }
            queue.tasks.push_back(Box::new(task));
        }
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Number of tasks waiting for a worker.
    pub fn pending(&self) -> usize {
        self.shared.lock().tasks.len()
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting tasks, drops everything still queued and wakes idle
    /// workers so they exit. Running tasks are left to finish. Returns the
    /// number of discarded tasks.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut queue = self.shared.lock();
            queue.closed = true;
            std::mem::take(&mut queue.tasks)
        };
        self.shared.ready.notify_all();

        if !discarded.is_empty() {
            warn!("Discarded {} queued tasks on shutdown", discarded.len());
        }
        discarded.len()
    }

    /// Closes the pool and waits for every worker to exit.
    pub fn shutdown(&mut self) {
        self.close();

        if self.workers.is_empty() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                error!("Worker thread exited with a panic");
            }
        }
        info!("Worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(id: usize, shared: &Shared) {
    debug!("Worker {} started", id);

    loop {
        let task = {
            let mut queue = shared.lock();
            loop {
                if queue.closed {
                    debug!("Worker {} stopping", id);
                    return;
                }
                if let Some(task) = queue.tasks.pop_front() {
                    break task;
                }
                queue = shared
                    .ready
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        debug!("Worker {} handling request", id);
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            error!("Worker {} recovered from a panicking task", id);
        }
        debug!("Worker {} finished request", id);
    }
}
