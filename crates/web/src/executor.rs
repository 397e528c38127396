//! Fixed-size thread pool backing the dispatcher.
//!
//! Accepted connections are submitted as tasks; shutdown closes the intake
//! and waits a bounded grace period for the in-flight count to reach zero,
//! abandoning stragglers rather than cancelling them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, unbounded};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Executor {
    sender: Mutex<Option<Sender<Job>>>,
    in_flight: Arc<InFlight>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Executor {
    pub(crate) fn new(threads: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let in_flight = Arc::new(InFlight::default());

        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let receiver = receiver.clone();
            let in_flight = in_flight.clone();
            handles.push(thread::spawn(move || {
                while let Ok(job) = receiver.recv() {
                    // a panicking task must not take the operating thread
                    // down with it, or leave the in-flight count stuck
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("task panicked");
                    }
                    in_flight.finish_one();
                }
            }));
        }

        Self { sender: Mutex::new(Some(sender)), in_flight, handles: Mutex::new(handles) }
    }

    /// Submits a task; queued tasks run as threads free up.
    pub(crate) fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => {
                self.in_flight.start_one();
                // the receivers outlive the sender, the send cannot fail
                sender.send(Box::new(job)).expect("executor channel disconnected");
            }
            None => warn!("executor is shut down, dropping task"),
        }
    }

    /// Stops accepting tasks; already-queued tasks still run.
    pub(crate) fn close(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Waits up to `grace` for submitted tasks to finish.
    ///
    /// Returns whether the executor fully drained; when it did, the
    /// operating threads are joined, otherwise they are left running their
    /// current task unattended.
    pub(crate) fn await_drain(&self, grace: Duration) -> bool {
        let drained = self.in_flight.wait_drained(grace);
        if drained {
            for handle in self.handles.lock().unwrap().drain(..) {
                let _ = handle.join();
            }
            debug!("executor drained");
        }
        drained
    }
}

/// Count of submitted-but-unfinished tasks, wired to a condition variable
/// so shutdown can sleep instead of spin.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn start_one(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn finish_one(&self) {
        let mut count = self.count.lock().unwrap();
        *count -= 1;
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self, grace: Duration) -> bool {
        let count = self.count.lock().unwrap();
        let (count, _timeout) = self.drained.wait_timeout_while(count, grace, |count| *count > 0).unwrap();
        *count == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn runs_every_submitted_task() {
        let executor = Executor::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..32 {
            let counter = counter.clone();
            executor.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        executor.close();
        assert!(executor.await_drain(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn queued_tasks_run_even_after_close() {
        let executor = Executor::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let counter = counter.clone();
            executor.execute(move || {
                thread::sleep(Duration::from_millis(10));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        executor.close();
        assert!(executor.await_drain(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn tasks_submitted_after_close_are_dropped() {
        let executor = Executor::new(1);
        executor.close();

        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = counter.clone();
            executor.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert!(executor.await_drain(Duration::from_millis(100)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_task_does_not_kill_the_operating_thread() {
        let executor = Executor::new(1);
        executor.execute(|| panic!("task bug"));

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            executor.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        executor.close();
        assert!(executor.await_drain(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn drain_gives_up_after_the_grace_period() {
        let executor = Executor::new(1);
        executor.execute(|| thread::sleep(Duration::from_millis(500)));

        executor.close();
        assert!(!executor.await_drain(Duration::from_millis(50)));
    }
}
