//! Graph-level notifications.

use crate::{service::FailureCause, state::ServiceState};
use chrono::{DateTime, Utc};
use futures::channel::oneshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// A service in the graph failed
#[derive(Debug, Clone)]
pub struct ServiceFailure<K> {
    /// Key of the failed service
    pub service: K,
    /// State the service failed from
    pub from: ServiceState,
    /// Reported cause
    pub cause: FailureCause,
    /// When the failure was observed
    pub failed_at: DateTime<Utc>,
}

/// Receives notifications about the graph as a whole
///
/// Callbacks run on whichever thread observed the transition and must not
/// block.
pub trait GraphListener<K>: Send + Sync {
    /// Every service reached RUNNING
    fn healthy(&self) {}

    /// Every service reached TERMINATED or FAILED
    fn stopped(&self) {}

    /// A service failed
    fn failure(&self, failure: &ServiceFailure<K>) {
        let _ = failure;
    }
}

/// Adapts a closure into a failure-only listener
pub(crate) struct FailureFn<F>(pub(crate) F);

impl<K, F> GraphListener<K> for FailureFn<F>
where
    F: Fn(&ServiceFailure<K>) + Send + Sync,
{
    fn failure(&self, failure: &ServiceFailure<K>) {
        (self.0)(failure)
    }
}

/// Listener set and waiters owned by one graph
pub(crate) struct GraphEvents<K> {
    listeners: RwLock<Vec<Arc<dyn GraphListener<K>>>>,
    healthy_sent: AtomicBool,
    stopped_sent: AtomicBool,
    waiters: Mutex<Vec<oneshot::Sender<()>>>,
}

impl<K> GraphEvents<K> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            healthy_sent: AtomicBool::new(false),
            stopped_sent: AtomicBool::new(false),
            waiters: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add_listener(&self, listener: Arc<dyn GraphListener<K>>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    fn snapshot(&self) -> Vec<Arc<dyn GraphListener<K>>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn failure(&self, failure: &ServiceFailure<K>) {
        for listener in self.snapshot() {
            listener.failure(failure);
        }
    }

    /// Sent at most once per graph
    pub(crate) fn healthy(&self) {
        if !self.healthy_sent.swap(true, Ordering::AcqRel) {
            for listener in self.snapshot() {
                listener.healthy();
            }
        }
    }

    /// Sent at most once per graph
    pub(crate) fn stopped(&self) {
        if !self.stopped_sent.swap(true, Ordering::AcqRel) {
            for listener in self.snapshot() {
                listener.stopped();
            }
        }
    }

    /// Future resolving on the next state change anywhere in the graph
    pub(crate) fn next_change(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub(crate) fn wake(&self) {
        let waiters = std::mem::take(
            &mut *self.waiters.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }
}
