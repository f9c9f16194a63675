//! Per-subscriber delivery queues.
//!
//! Every registered tail gets a bounded queue and a dedicated worker thread
//! draining it. The writer only ever `try_send`s, so a slow, blocked or
//! panicking subscriber affects nothing but its own queue:
//!
//! ```text
//! LogRelay::write ──► [bounded queue] ──► worker ──► subscriber.deliver()
//!                                                └─► panic caught and logged
//! ```
//!
//! A full queue drops the line for that subscriber only.

use crate::logs::subscriber::TailSubscriber;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Sending side of one subscriber's queue.
///
/// Dropping it closes the queue; the worker delivers what is already queued
/// and then exits.
pub(crate) struct TailWorker {
    sender: mpsc::Sender<Arc<str>>,
    /// Lines queued or being delivered
    pending: Arc<AtomicUsize>,
}

impl TailWorker {
    /// Start a worker for `subscriber` with room for `queue_capacity` lines
    pub(crate) fn spawn(
        id: &str,
        subscriber: Arc<dyn TailSubscriber>,
        queue_capacity: usize,
    ) -> io::Result<Self> {
        let (sender, mut receiver) = mpsc::channel::<Arc<str>>(queue_capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        let worker_id = id.to_string();
        thread::Builder::new()
            .name(format!("tail-{}", id))
            .spawn(move || {
                while let Some(line) = receiver.blocking_recv() {
                    deliver_isolated(&worker_id, subscriber.as_ref(), &line);
                    worker_pending.fetch_sub(1, Ordering::AcqRel);
                }
                tracing::trace!(subscriber = %worker_id, "Tail worker stopped");
            })?;

        Ok(Self { sender, pending })
    }

    /// Queue a line without waiting; returns false if it was dropped
    pub(crate) fn enqueue(&self, id: &str, line: &Arc<str>) -> bool {
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(Arc::clone(line)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                tracing::warn!(subscriber = id, "Tail queue full, dropping line");
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                false
            }
        }
    }

    /// Lines not yet delivered
    pub(crate) fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Run one delivery, containing any panic it raises
fn deliver_isolated(id: &str, subscriber: &dyn TailSubscriber, line: &str) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| subscriber.deliver(id, line)));
    if let Err(payload) = outcome {
        tracing::warn!(
            subscriber = id,
            "Tail subscriber panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
