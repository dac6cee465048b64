use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Posible `WorkerPool` errors.
#[derive(Debug)]
pub enum WorkerPoolError {
    QueueClosed,
}

/// A fixed-size pool of connection workers.
///
/// Queued jobs land on a channel that every worker drains through a shared
/// receiver. There is no separate shutdown message: dropping the pool closes
/// the sending half, each worker observes the disconnect once the queue runs
/// dry and exits, and `drop` joins them all.
pub struct WorkerPool {
    queue: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns a pool with `size` workers.
    ///
    /// # Panics
    /// If `size` is zero.
    pub fn new(size: usize) -> WorkerPool {
        assert!(size > 0, "a worker pool needs at least one worker");

        let (queue, jobs) = channel::<Job>();
        let jobs = Arc::new(Mutex::new(jobs));

        let workers = (0..size)
            .map(|id| {
                let jobs = Arc::clone(&jobs);
                thread::spawn(move || Self::work(id, jobs))
            })
            .collect();

        WorkerPool {
            queue: Some(queue),
            workers,
        }
    }

    /// Hands a closure to the next idle worker.
    ///
    /// # Errors
    /// - `QueueClosed` if the pool is already shutting down.
    pub fn execute<F>(&self, job: F) -> Result<(), WorkerPoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.queue {
            Some(queue) => queue
                .send(Box::new(job))
                .map_err(|_| WorkerPoolError::QueueClosed),
            None => Err(WorkerPoolError::QueueClosed),
        }
    }

    fn work(id: usize, jobs: Arc<Mutex<Receiver<Job>>>) {
        loop {
            // Hold the queue lock only to take a job, never while running one.
            let job = match jobs.lock() {
                Ok(receiver) => receiver.recv(),
                Err(_) => break,
            };
            match job {
                Ok(job) => {
                    debug!("Worker {} picked up a connection", id);
                    job();
                }
                // Disconnected queue: the pool is gone.
                Err(_) => break,
            }
        }
        debug!("Worker {} exiting", id);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the queue is the shutdown signal for every worker.
        drop(self.queue.take());
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("A worker panicked while shutting down");
            }
        }
    }
}
