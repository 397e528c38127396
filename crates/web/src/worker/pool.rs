//! The bounded pool of reusable workers.

use std::fmt;

use crossbeam_channel::{Receiver, Sender, bounded};
use thiserror::Error;
use tracing::debug;

use super::Worker;

/// Pool construction failure.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool requires at least one worker")]
    NoWorkers,
}

/// A fixed set of [`Worker`]s built once at startup.
///
/// `acquire` transfers exclusive ownership of a worker to the caller and
/// blocks while none is available; `release` returns it. Ownership moves
/// by value, so a worker is either in the pool or held by exactly one
/// caller, and releasing one twice is unrepresentable.
pub struct WorkerPool {
    sender: Sender<Worker>,
    receiver: Receiver<Worker>,
    capacity: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

impl WorkerPool {
    /// Builds the pool, invoking `factory` once per slot.
    pub fn new<F>(capacity: usize, factory: F) -> Result<Self, PoolError>
    where
        F: Fn() -> Worker,
    {
        if capacity == 0 {
            return Err(PoolError::NoWorkers);
        }

        let (sender, receiver) = bounded(capacity);
        for _ in 0..capacity {
            // the channel is sized for exactly this many workers
            sender.send(factory()).expect("worker pool channel rejected a worker it was sized for");
        }
        debug!(capacity, "worker pool ready");

        Ok(Self { sender, receiver, capacity })
    }

    /// Total number of workers, available or held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers currently available.
    pub fn available(&self) -> usize {
        self.receiver.len()
    }

    /// Takes a worker, blocking the calling thread until one is free.
    pub fn acquire(&self) -> Worker {
        // the pool owns the sender half, so the channel never disconnects
        self.receiver.recv().expect("worker pool disconnected")
    }

    /// Returns a worker to availability.
    pub fn release(&self, worker: Worker) {
        // membership is bounded by construction, the send cannot overflow
        self.sender.send(worker).expect("worker pool disconnected")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::config::ServerConfig;
    use crate::procedure::ProcedureChain;
    use crate::router::Router;
    use crate::server::ServerContext;
    use crate::session::MemorySessionProvider;

    fn pool(capacity: usize) -> Result<WorkerPool, PoolError> {
        let context = Arc::new(ServerContext::new(
            Router::builder().build().unwrap(),
            Box::new(MemoryCacheStore::new()),
            Box::new(MemorySessionProvider::new()),
            ProcedureChain::empty(),
            ServerConfig::default(),
        ));
        WorkerPool::new(capacity, move || Worker::new(context.clone()))
    }

    #[test]
    fn zero_capacity_is_a_configuration_error() {
        assert!(matches!(pool(0), Err(PoolError::NoWorkers)));
    }

    #[test]
    fn membership_is_constant_under_concurrent_use() {
        let pool = Arc::new(pool(4).unwrap());
        assert_eq!(pool.available(), 4);

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let worker = pool.acquire();
                        pool.release(worker);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(pool.available(), pool.capacity());
    }

    #[test]
    fn acquire_blocks_until_a_worker_is_released() {
        let pool = Arc::new(pool(1).unwrap());
        let held = pool.acquire();
        assert_eq!(pool.available(), 0);

        let (sent, received) = mpsc::channel();
        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let worker = pool.acquire();
                sent.send(()).unwrap();
                pool.release(worker);
            })
        };

        // the waiter cannot make progress while the worker is held
        assert!(received.recv_timeout(Duration::from_millis(100)).is_err());

        pool.release(held);
        assert!(received.recv_timeout(Duration::from_secs(1)).is_ok());
        waiter.join().unwrap();
    }
}
