//! Runtime-agnostic spawning for async services.
//!
//! The graph itself never blocks or spawns. [`AsyncService`](crate::AsyncService)
//! needs somewhere to run its startup and shutdown futures, and this trait
//! keeps that choice with the caller.

use std::future::Future;
use std::pin::Pin;

/// Boxed future handed to a [`Spawner`]
pub type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs futures in the background on some async runtime
pub trait Spawner: Send + Sync + 'static {
    /// Spawn a future and detach it
    fn spawn(&self, task: BoxedTask);
}

/// Spawner for the smol global executor
#[cfg(feature = "smol")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolSpawner;

#[cfg(feature = "smol")]
impl Spawner for SmolSpawner {
    fn spawn(&self, task: BoxedTask) {
        smol::spawn(task).detach();
    }
}

/// Spawner for a tokio runtime
#[cfg(feature = "tokio")]
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

#[cfg(feature = "tokio")]
impl TokioSpawner {
    /// Spawn onto the runtime behind `handle`
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime of the calling context, if any
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

#[cfg(feature = "tokio")]
impl Spawner for TokioSpawner {
    fn spawn(&self, task: BoxedTask) {
        drop(self.handle.spawn(task));
    }
}

#[cfg(all(test, feature = "smol"))]
mod tests {
    use super::*;

    #[smol_potat::test]
    async fn test_smol_spawner() {
        let (tx, rx) = futures::channel::oneshot::channel();
        SmolSpawner.spawn(Box::pin(async move {
            let _ = tx.send(42);
        }));
        assert_eq!(rx.await.unwrap(), 42);
    }
}
