//! The validated graph handed back to callers.

use crate::{
    Error, Result,
    coordinated::{Coordinator, NodeId},
    listener::{FailureFn, GraphListener, ServiceFailure},
    service::{Service, ServiceKey},
    state::ServiceState,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A linked, acyclic set of coordinated services
///
/// Built by [`GraphRegistry::validate_and_link`](crate::GraphRegistry::validate_and_link).
/// [`start_async`](Self::start_async) and [`stop_async`](Self::stop_async)
/// request a transition for every service and return immediately; each
/// service then starts or stops as soon as its position in the graph
/// allows it.
pub struct ServiceGraph<K: ServiceKey> {
    core: Arc<Coordinator<K>>,
    index: HashMap<K, NodeId>,
}

impl<K: ServiceKey> ServiceGraph<K> {
    pub(crate) fn new(core: Arc<Coordinator<K>>) -> Self {
        let index = core
            .ids()
            .map(|id| (core.node(id).key.clone(), id))
            .collect();
        Self { core, index }
    }

    /// Request every service to start
    pub fn start_async(&self) {
        self.core.start_all();
    }

    /// Request every service to stop
    ///
    /// Services that never started are marked TERMINATED without touching
    /// the wrapped service.
    pub fn stop_async(&self) {
        self.core.stop_all();
    }

    /// Subscribe to graph-level notifications
    pub fn add_listener(&self, listener: Arc<dyn GraphListener<K>>) {
        self.core.events.add_listener(listener);
    }

    /// Subscribe to service failures
    pub fn add_failure_listener<F>(&self, listener: F)
    where
        F: Fn(&ServiceFailure<K>) + Send + Sync + 'static,
    {
        self.core.events.add_listener(Arc::new(FailureFn(listener)));
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the graph has no services
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Whether `key` is registered
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Keys in registration order
    pub fn keys(&self) -> Vec<K> {
        self.core.nodes().map(|node| node.key.clone()).collect()
    }

    /// Coordinated state of `key`
    pub fn state_of(&self, key: &K) -> Option<ServiceState> {
        self.id(key).map(|id| self.core.node(id).state())
    }

    /// Coordinated state of every service, in registration order
    pub fn states(&self) -> Vec<(K, ServiceState)> {
        self.core
            .nodes()
            .map(|node| (node.key.clone(), node.state()))
            .collect()
    }

    /// The wrapped service of `key`, built if it was not yet
    pub fn service(&self, key: &K) -> Option<Arc<dyn Service>> {
        self.id(key).map(|id| self.core.node(id).service().clone())
    }

    /// Services that must be RUNNING before `key` may start
    pub fn upstream_of(&self, key: &K) -> Option<Vec<K>> {
        self.id(key)
            .map(|id| self.core.keys_of(&self.core.upstream(id)))
    }

    /// Services that must be TERMINATED before `key` may stop
    pub fn downstream_of(&self, key: &K) -> Option<Vec<K>> {
        self.id(key)
            .map(|id| self.core.keys_of(&self.core.downstream(id)))
    }

    /// Services declared as depending directly on `key`
    pub fn dependents_of(&self, key: &K) -> Option<Vec<K>> {
        self.id(key)
            .map(|id| self.core.keys_of(&self.core.direct_dependents(id)))
    }

    /// Services grouped by start level
    ///
    /// Every service in level N only waits on services in levels below N, so
    /// each level can start concurrently once the previous one is running.
    pub fn startup_plan(&self) -> Vec<Vec<K>> {
        self.core
            .levels()
            .iter()
            .map(|level| self.core.keys_of(level))
            .collect()
    }

    /// Reverse of [`startup_plan`](Self::startup_plan)
    pub fn shutdown_plan(&self) -> Vec<Vec<K>> {
        let mut plan = self.startup_plan();
        plan.reverse();
        plan
    }

    /// Whether every service is RUNNING
    pub fn is_healthy(&self) -> bool {
        self.core.all(|state| state == ServiceState::Running)
    }

    /// Whether every service is TERMINATED or FAILED
    pub fn is_stopped(&self) -> bool {
        self.core.all(ServiceState::is_terminal)
    }

    /// Wait until every service is RUNNING
    ///
    /// Fails as soon as any service fails or terminates, since the graph can
    /// then never become healthy.
    pub async fn await_healthy(&self) -> Result<()> {
        loop {
            let change = self.core.events.next_change();
            let mut cause_pending = false;
            for node in self.core.nodes() {
                match node.state() {
                    ServiceState::Failed => match node.failure() {
                        Some(cause) => {
                            return Err(Error::ServiceFailed {
                                service: node.key.to_string(),
                                cause: cause.to_string(),
                            });
                        }
                        // The cause lands right after the state flips
                        None => cause_pending = true,
                    },
                    ServiceState::Terminated => {
                        return Err(Error::Unhealthy {
                            service: node.key.to_string(),
                            state: ServiceState::Terminated,
                        });
                    }
                    _ => {}
                }
            }
            if !cause_pending && self.is_healthy() {
                return Ok(());
            }
            let _ = change.await;
        }
    }

    /// Wait until every service is TERMINATED or FAILED
    ///
    /// There is no deadline: a service that never terminates keeps this
    /// pending, together with everything upstream of it. Callers wanting a
    /// bound race this future against their runtime's timer and inspect
    /// [`states`](Self::states) on expiry.
    pub async fn await_stopped(&self) {
        loop {
            let change = self.core.events.next_change();
            if self.is_stopped() {
                return;
            }
            let _ = change.await;
        }
    }

    fn id(&self, key: &K) -> Option<NodeId> {
        self.index.get(key).copied()
    }
}

impl<K: ServiceKey> fmt::Debug for ServiceGraph<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.states()).finish()
    }
}
