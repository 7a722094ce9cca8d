//! Services whose startup and shutdown are async functions.

use crate::{
    Result,
    basic::{BasicService, Lifecycle, ServiceControl},
    runtime::Spawner,
    service::{Listener, Service},
    state::ServiceState,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Async startup and shutdown work
///
/// An error from either phase moves the service to FAILED.
#[async_trait]
pub trait AsyncLifecycle: Send + Sync + 'static {
    /// Bring the service up
    async fn start_up(&self) -> anyhow::Result<()>;

    /// Bring the service down
    async fn shut_down(&self) -> anyhow::Result<()>;
}

/// Runs an [`AsyncLifecycle`] on a [`Spawner`]
struct SpawnedLifecycle<L> {
    lifecycle: Arc<L>,
    spawner: Arc<dyn Spawner>,
}

impl<L: AsyncLifecycle> Lifecycle for SpawnedLifecycle<L> {
    fn do_start(&self, control: ServiceControl) {
        let lifecycle = self.lifecycle.clone();
        self.spawner.spawn(Box::pin(async move {
            match lifecycle.start_up().await {
                Ok(()) => control.notify_started(),
                Err(e) => control.notify_failed(e),
            }
        }));
    }

    fn do_stop(&self, control: ServiceControl) {
        let lifecycle = self.lifecycle.clone();
        self.spawner.spawn(Box::pin(async move {
            match lifecycle.shut_down().await {
                Ok(()) => control.notify_stopped(),
                Err(e) => control.notify_failed(e),
            }
        }));
    }
}

/// A [`Service`] backed by an [`AsyncLifecycle`]
///
/// `start` and `stop` return immediately; the async work runs on the spawner
/// and reports back through the usual listener callbacks.
#[derive(Debug)]
pub struct AsyncService {
    inner: BasicService,
}

impl AsyncService {
    /// Create a service in the NEW state
    pub fn new<L: AsyncLifecycle>(
        name: impl Into<String>,
        lifecycle: L,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        Self {
            inner: BasicService::new(
                name,
                SpawnedLifecycle {
                    lifecycle: Arc::new(lifecycle),
                    spawner,
                },
            ),
        }
    }

    /// Service name
    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

impl Service for AsyncService {
    fn state(&self) -> ServiceState {
        self.inner.state()
    }

    fn start(&self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&self) -> Result<()> {
        self.inner.stop()
    }

    fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.inner.add_listener(listener);
    }
}
