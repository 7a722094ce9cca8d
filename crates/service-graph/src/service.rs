//! The service abstraction coordinated by the graph.
//!
//! A [`Service`] is an opaque state machine owned by some external
//! collaborator. The graph only asks for its state, requests start and stop,
//! and listens for transitions.

use crate::{Result, state::ServiceState};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

/// Cause attached to a failed service
pub type FailureCause = Arc<anyhow::Error>;

/// Keys identifying services in a graph
pub trait ServiceKey: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> ServiceKey for T where T: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Receives state transitions of a single service
///
/// Callbacks may be invoked from any thread, including the thread that
/// called [`Service::start`] or [`Service::stop`].
pub trait Listener: Send + Sync {
    /// Service moved from NEW to STARTING
    fn starting(&self) {}

    /// Service moved from STARTING to RUNNING
    fn running(&self) {}

    /// Service began shutting down from `from`
    fn stopping(&self, from: ServiceState) {
        let _ = from;
    }

    /// Service reached TERMINATED from `from`
    fn terminated(&self, from: ServiceState) {
        let _ = from;
    }

    /// Service reached FAILED from `from`
    fn failed(&self, from: ServiceState, cause: FailureCause) {
        let _ = (from, cause);
    }
}

/// A long-lived stateful component
///
/// `start` and `stop` only request a transition; completion is reported
/// through the registered [`Listener`]s.
pub trait Service: Send + Sync {
    /// Current state
    fn state(&self) -> ServiceState;

    /// Request startup. Fails if the service is not NEW.
    fn start(&self) -> Result<()>;

    /// Request shutdown
    fn stop(&self) -> Result<()>;

    /// Subscribe to state transitions
    fn add_listener(&self, listener: Arc<dyn Listener>);
}

/// Builds the service wrapped by a coordinator, called at most once
pub type ServiceFactory = Box<dyn FnOnce() -> Arc<dyn Service> + Send>;
