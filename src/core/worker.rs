// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Background worker threads with a bounded join

use anyhow::{Context, Result};
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// A named OS thread that can be waited on for a limited time
pub struct WorkerHandle {
    name: String,
    handle: Option<JoinHandle<()>>,
    // Disconnects when the thread exits, panics included
    done: Receiver<()>,
}

impl WorkerHandle {
    pub fn spawn<F>(name: &str, f: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, done) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _tx = tx;
                f();
            })
            .with_context(|| format!("spawning worker {}", name))?;
        debug!("Worker {} started", name);

        Ok(Self {
            name: name.to_string(),
            handle: Some(handle),
            done,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait up to `timeout` for the thread to exit
    ///
    /// Returns false if it is still running; the thread is then left to
    /// finish on its own.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        if self.handle.is_none() {
            return true;
        }

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    if handle.join().is_err() {
                        warn!("Worker {} panicked", self.name);
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Worker {} still running after {:?}; abandoning it", self.name, timeout);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_join_finished_worker() {
        let (tx, rx) = unbounded();
        let mut worker = WorkerHandle::spawn("test-worker", move || {
            tx.send(42).unwrap();
        })
        .unwrap();
        assert_eq!(rx.recv().unwrap(), 42);
        assert!(worker.join_timeout(Duration::from_secs(5)));
        assert!(worker.is_finished());
        // Joining twice is harmless
        assert!(worker.join_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_join_times_out_on_blocked_worker() {
        let (tx, rx) = unbounded::<()>();
        let mut worker = WorkerHandle::spawn("blocked-worker", move || {
            let _ = rx.recv();
        })
        .unwrap();
        assert!(!worker.join_timeout(Duration::from_millis(50)));
        assert!(!worker.is_finished());
        drop(tx);
    }

    #[test]
    fn test_panicking_worker_counts_as_finished() {
        let mut worker = WorkerHandle::spawn("panicky-worker", || panic!("boom")).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(5)));
    }
}
