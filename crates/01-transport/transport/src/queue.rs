//! Serial execution contexts.
//!
//! A [`SerialQueue`] runs jobs one at a time, in submission order, on a
//! dedicated worker thread. Reply continuations and barrier blocks for one
//! connection share a queue, which is what makes them mutually exclusive.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{TransportError, TransportResult};

/// Unit of work accepted by a [`SerialQueue`].
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Strictly FIFO, single-worker execution queue.
///
/// Cloning yields another handle onto the same worker. When the last clone is
/// dropped the channel closes; the worker drains whatever is still queued and
/// exits.
#[derive(Clone)]
pub struct SerialQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    label: String,
    tx: Sender<Job>,
    worker: ThreadId,
}

impl SerialQueue {
    /// Starts a new queue whose worker thread is named after `label`.
    pub fn new(label: impl Into<String>) -> TransportResult<Self> {
        let label = label.into();
        let (tx, rx) = unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(label.clone())
            .spawn(move || run_worker(rx))
            .map_err(|source| TransportError::Spawn {
                label: label.clone(),
                source,
            })?;
        let worker = handle.thread().id();
        Ok(Self {
            inner: Arc::new(QueueInner { label, tx, worker }),
        })
    }

    /// Label the queue was created with.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Enqueues `job` without blocking the caller.
    pub fn async_run<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.inner.tx.send(Box::new(job)).is_err() {
            tracing::warn!(queue = %self.inner.label, "serial queue worker gone; job dropped");
        }
    }

    /// Returns true when called from this queue's worker thread.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.worker
    }

    /// Blocks until every job enqueued before this call has finished.
    ///
    /// Returns immediately when called from the queue's own worker, since
    /// waiting there could never complete.
    pub fn flush(&self) {
        if self.is_current() {
            return;
        }
        let (done_tx, done_rx) = bounded::<()>(1);
        self.async_run(move || {
            let _ = done_tx.send(());
        });
        let _ = done_rx.recv();
    }

    /// Returns true if both handles drive the same worker.
    pub fn same_queue(&self, other: &SerialQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for SerialQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialQueue")
            .field("label", &self.inner.label)
            .finish()
    }
}

fn run_worker(rx: Receiver<Job>) {
    for job in rx {
        // A panicking job must not take the rest of the queue down with it.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            tracing::error!(
                queue = thread::current().name().unwrap_or("<unnamed>"),
                "serial queue job panicked"
            );
        }
    }
}
