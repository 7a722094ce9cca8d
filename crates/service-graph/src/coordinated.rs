//! Coordinated services and the arena that links them.
//!
//! Every registered service is wrapped in a [`CoordinatedService`] that lives
//! in a [`Coordinator`] arena and refers to its neighbours by [`NodeId`].
//! The coordinator decides when each wrapped service may start or stop:
//!
//! - a service starts once every member of its upstream set is RUNNING
//! - a service stops once every member of its downstream set is TERMINATED
//!
//! Gating is event driven. Each RUNNING transition retries the start of the
//! service's downstream set, each TERMINATED transition retries the stop of
//! its upstream set. Nothing blocks; a gate that is not ready is simply
//! retried by the next transition.

use crate::{
    Error, Result,
    cycle::{self, Colors},
    listener::{GraphEvents, ServiceFailure},
    service::{FailureCause, Listener, Service, ServiceFactory, ServiceKey},
    state::{AtomicState, ServiceState},
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};
use tracing::{debug, info, warn};

/// Index of a service in the coordinator arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct NodeId(pub(crate) usize);

/// Declared edges of one node
#[derive(Debug, Default)]
struct Edges {
    /// Must be RUNNING before this one starts
    direct_depends_on: BTreeSet<NodeId>,
    /// Depend on this one
    direct_dependencies: BTreeSet<NodeId>,
    /// Start after this one, before any of its dependents
    enhancements: BTreeSet<NodeId>,
    /// Service this one enhances
    enhancement_target: Option<NodeId>,
}

/// Which underlying calls have been issued
#[derive(Debug, Default)]
struct Issued {
    start: bool,
    stop: bool,
}

/// Outcome of a stop request on one node
enum StopRequest {
    /// Already stopping or finished
    Ignored,
    /// Marked STOPPING, waits for its downstream set
    Pending,
    /// Never started, marked TERMINATED directly
    Cancelled,
}

/// A service wrapped with its position in the graph
pub(crate) struct CoordinatedService<K> {
    pub(crate) key: K,
    /// Coordinated state, readable by neighbours without locking
    state: AtomicState,
    /// Critical section for the start/stop check-and-act
    gate: Mutex<Issued>,
    service: LazyLock<Arc<dyn Service>, ServiceFactory>,
    edges: RwLock<Edges>,
    upstream: RwLock<Option<Arc<[NodeId]>>>,
    downstream: RwLock<Option<Arc<[NodeId]>>>,
    failure: OnceLock<FailureCause>,
}

impl<K: ServiceKey> CoordinatedService<K> {
    fn new(
        id: NodeId,
        key: K,
        factory: ServiceFactory,
        coordinator: Weak<Coordinator<K>>,
    ) -> Self {
        let listener = CoordinatorListener { coordinator, id };
        let realize: ServiceFactory = Box::new(move || {
            let service = factory();
            service.add_listener(Arc::new(listener));
            service
        });

        Self {
            key,
            state: AtomicState::new(ServiceState::New),
            gate: Mutex::new(Issued::default()),
            service: LazyLock::new(realize),
            edges: RwLock::new(Edges::default()),
            upstream: RwLock::new(None),
            downstream: RwLock::new(None),
            failure: OnceLock::new(),
        }
    }

    /// Coordinated state
    pub(crate) fn state(&self) -> ServiceState {
        self.state.load()
    }

    /// The wrapped service, built on first access
    pub(crate) fn service(&self) -> &Arc<dyn Service> {
        &self.service
    }

    pub(crate) fn failure(&self) -> Option<&FailureCause> {
        self.failure.get()
    }

    fn gate(&self) -> MutexGuard<'_, Issued> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: fmt::Debug> fmt::Debug for CoordinatedService<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatedService")
            .field("key", &self.key)
            .field("state", &self.state.load())
            .finish()
    }
}

/// Forwards transitions of a wrapped service to its coordinator
struct CoordinatorListener<K> {
    coordinator: Weak<Coordinator<K>>,
    id: NodeId,
}

impl<K: ServiceKey> Listener for CoordinatorListener<K> {
    fn running(&self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_running(self.id);
        }
    }

    fn terminated(&self, from: ServiceState) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_terminated(self.id, from);
        }
    }

    fn failed(&self, from: ServiceState, cause: FailureCause) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_failed(self.id, from, cause);
        }
    }
}

/// Arena of coordinated services plus the graph's listeners
pub(crate) struct Coordinator<K> {
    nodes: Vec<CoordinatedService<K>>,
    pub(crate) events: GraphEvents<K>,
}

impl<K: ServiceKey> Coordinator<K> {
    /// Build the arena, one node per registration in order
    pub(crate) fn new(registrations: Vec<(K, ServiceFactory)>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            nodes: registrations
                .into_iter()
                .enumerate()
                .map(|(index, (key, factory))| {
                    CoordinatedService::new(NodeId(index), key, factory, weak.clone())
                })
                .collect(),
            events: GraphEvents::new(),
        })
    }

    pub(crate) fn node(&self, id: NodeId) -> &CoordinatedService<K> {
        &self.nodes[id.0]
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    pub(crate) fn nodes(&self) -> impl Iterator<Item = &CoordinatedService<K>> {
        self.nodes.iter()
    }

    pub(crate) fn keys_of(&self, ids: &[NodeId]) -> Vec<K> {
        ids.iter().map(|id| self.node(*id).key.clone()).collect()
    }

    fn ensure_new(&self, id: NodeId) -> Result<()> {
        let node = self.node(id);
        match node.state() {
            ServiceState::New => Ok(()),
            state => Err(Error::NotNew {
                service: node.key.to_string(),
                state,
            }),
        }
    }

    /// Make each of `services` depend on `id`
    pub(crate) fn add_dependent_services(&self, id: NodeId, services: &[NodeId]) -> Result<()> {
        self.ensure_new(id)?;
        for dependent in services {
            self.ensure_new(*dependent)?;
        }

        write(&self.node(id).edges)
            .direct_dependencies
            .extend(services.iter().copied());
        for dependent in services {
            write(&self.node(*dependent).edges).direct_depends_on.insert(id);
        }

        self.invalidate_derived();
        Ok(())
    }

    /// Make each of `services` an enhancement of `id`
    pub(crate) fn add_enhancements(&self, id: NodeId, services: &[NodeId]) -> Result<()> {
        self.ensure_new(id)?;
        for enhancement in services {
            self.ensure_new(*enhancement)?;
            if let Some(existing) = read(&self.node(*enhancement).edges).enhancement_target {
                if existing != id {
                    return Err(Error::EnhancementConflict {
                        enhancement: self.node(*enhancement).key.to_string(),
                        existing: self.node(existing).key.to_string(),
                        requested: self.node(id).key.to_string(),
                    });
                }
            }
        }

        write(&self.node(id).edges)
            .enhancements
            .extend(services.iter().copied());
        for enhancement in services {
            write(&self.node(*enhancement).edges).enhancement_target = Some(id);
        }

        self.invalidate_derived();
        Ok(())
    }

    fn invalidate_derived(&self) {
        for node in &self.nodes {
            *write(&node.upstream) = None;
            *write(&node.downstream) = None;
        }
    }

    /// Services declared as depending directly on `id`
    pub(crate) fn direct_dependents(&self, id: NodeId) -> Vec<NodeId> {
        read(&self.node(id).edges)
            .direct_dependencies
            .iter()
            .copied()
            .collect()
    }

    fn enhancement_target(&self, id: NodeId) -> Option<NodeId> {
        read(&self.node(id).edges).enhancement_target
    }

    /// Enhancements of `id`, their enhancements, and so on
    fn transitive_enhancements(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut found = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = read(&self.node(id).edges)
            .enhancements
            .iter()
            .copied()
            .collect();

        while let Some(next) = queue.pop_front() {
            if found.insert(next) {
                queue.extend(read(&self.node(next).edges).enhancements.iter().copied());
            }
        }
        found
    }

    /// Services that must be RUNNING before `id` may start
    pub(crate) fn upstream(&self, id: NodeId) -> Arc<[NodeId]> {
        let node = self.node(id);
        if let Some(cached) = read(&node.upstream).as_ref() {
            return cached.clone();
        }

        let (target, depends_on) = {
            let edges = read(&node.edges);
            (edges.enhancement_target, edges.direct_depends_on.clone())
        };
        let mut upstream: BTreeSet<NodeId> = target.into_iter().collect();
        for dependency in depends_on {
            upstream.insert(dependency);
            upstream.extend(self.transitive_enhancements(dependency));
        }
        // An enhancement that also depends on its own target
        upstream.remove(&id);

        let upstream: Arc<[NodeId]> = upstream.into_iter().collect();
        *write(&node.upstream) = Some(upstream.clone());
        upstream
    }

    /// Services that must be TERMINATED before `id` may stop
    ///
    /// Exactly the services that have `id` in their upstream set, so stop
    /// order mirrors start order.
    pub(crate) fn downstream(&self, id: NodeId) -> Arc<[NodeId]> {
        let node = self.node(id);
        if let Some(cached) = read(&node.downstream).as_ref() {
            return cached.clone();
        }

        let downstream: Arc<[NodeId]> = self
            .ids()
            .filter(|other| self.upstream(*other).contains(&id))
            .collect();
        *write(&node.downstream) = Some(downstream.clone());
        downstream
    }

    /// Find a cycle in the enhancement chains, then in the upstream relation
    ///
    /// Enhancement chains go first since upstream sets are built from
    /// transitive enhancements.
    pub(crate) fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut colors = Colors::new();
        for id in self.ids() {
            let found = cycle::find_cycle(id, &mut colors, |node| {
                self.enhancement_target(node).into_iter().collect()
            });
            if found.is_some() {
                return found;
            }
        }

        let mut colors = Colors::new();
        self.ids().find_map(|id| {
            cycle::find_cycle(id, &mut colors, |node| self.upstream(node).to_vec())
        })
    }

    /// Group services into start levels; level N only waits on levels < N
    pub(crate) fn levels(&self) -> Vec<Vec<NodeId>> {
        let mut waiting: HashMap<NodeId, usize> = self
            .ids()
            .map(|id| (id, self.upstream(id).len()))
            .collect();

        let mut level: Vec<NodeId> = self.ids().filter(|id| waiting[id] == 0).collect();
        let mut levels = Vec::new();

        while !level.is_empty() {
            let mut next = BTreeSet::new();
            for id in &level {
                for dependent in self.downstream(*id).iter() {
                    if let Some(count) = waiting.get_mut(dependent) {
                        *count -= 1;
                        if *count == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }
            levels.push(std::mem::take(&mut level));
            level = next.into_iter().collect();
        }
        levels
    }

    /// Mark every NEW service STARTING and start the ones that are ready
    pub(crate) fn start_all(&self) {
        for node in &self.nodes {
            let _gate = node.gate();
            if node.state.transition(ServiceState::New, ServiceState::Starting) {
                debug!(service = %node.key, "Start requested");
            }
        }
        self.state_changed();

        for id in self.ids() {
            self.start_if_ready(id);
        }
    }

    /// Mark every service STOPPING and stop the ones that are ready
    pub(crate) fn stop_all(&self) {
        for id in self.ids() {
            match self.request_stop(id) {
                StopRequest::Cancelled => {
                    info!(service = %self.node(id).key, "Service never started, marked terminated");
                }
                StopRequest::Pending => {
                    debug!(service = %self.node(id).key, "Stop requested");
                }
                StopRequest::Ignored => {}
            }
        }
        self.state_changed();

        for id in self.ids() {
            self.stop_if_ready(id);
        }
    }

    fn request_stop(&self, id: NodeId) -> StopRequest {
        let node = self.node(id);
        let mut issued = node.gate();
        loop {
            let current = node.state.load();
            let (next, outcome) = match current {
                ServiceState::New => (ServiceState::Terminated, StopRequest::Cancelled),
                ServiceState::Starting if !issued.start => {
                    (ServiceState::Terminated, StopRequest::Cancelled)
                }
                ServiceState::Starting | ServiceState::Running => {
                    (ServiceState::Stopping, StopRequest::Pending)
                }
                _ => return StopRequest::Ignored,
            };
            if node.state.transition(current, next) {
                if matches!(outcome, StopRequest::Cancelled) {
                    issued.start = true;
                }
                return outcome;
            }
        }
    }

    /// Start the wrapped service of `id` if it was requested and every
    /// upstream service is RUNNING
    pub(crate) fn start_if_ready(&self, id: NodeId) {
        let node = self.node(id);
        {
            let mut issued = node.gate();
            if issued.start || node.state() != ServiceState::Starting {
                return;
            }
            if node.service().state() != ServiceState::New {
                return;
            }
            let upstream = self.upstream(id);
            if let Some(blocker) = upstream
                .iter()
                .find(|other| self.node(**other).state() != ServiceState::Running)
            {
                debug!(service = %node.key, waiting_on = %self.node(*blocker).key, "Start deferred");
                return;
            }
            issued.start = true;
        }

        info!(service = %node.key, "Starting service");
        if let Err(e) = node.service().start() {
            warn!(service = %node.key, error = %e, "Service rejected start");
        }
    }

    /// Stop the wrapped service of `id` if it was requested and every
    /// downstream service is TERMINATED
    pub(crate) fn stop_if_ready(&self, id: NodeId) {
        let node = self.node(id);
        {
            let mut issued = node.gate();
            if issued.stop || node.state() != ServiceState::Stopping {
                return;
            }
            if node.service().state() != ServiceState::Running {
                return;
            }
            let downstream = self.downstream(id);
            if let Some(blocker) = downstream
                .iter()
                .find(|other| self.node(**other).state() != ServiceState::Terminated)
            {
                debug!(service = %node.key, waiting_on = %self.node(*blocker).key, "Stop deferred");
                return;
            }
            issued.stop = true;
        }

        info!(service = %node.key, "Stopping service");
        if let Err(e) = node.service().stop() {
            warn!(service = %node.key, error = %e, "Service rejected stop");
        }
    }

    fn on_running(&self, id: NodeId) {
        let node = self.node(id);
        if node.state.transition(ServiceState::Starting, ServiceState::Running) {
            info!(service = %node.key, "Service running");
        }
        self.state_changed();

        for dependent in self.downstream(id).iter() {
            self.start_if_ready(*dependent);
        }
        // Stop was requested while the service was still starting
        if node.state() == ServiceState::Stopping {
            self.stop_if_ready(id);
        }
    }

    fn on_terminated(&self, id: NodeId, from: ServiceState) {
        let node = self.node(id);
        if node.state.finish(ServiceState::Terminated).is_some() {
            info!(service = %node.key, %from, "Service terminated");
        }
        self.state_changed();

        for dependency in self.upstream(id).iter() {
            self.stop_if_ready(*dependency);
        }
    }

    fn on_failed(&self, id: NodeId, from: ServiceState, cause: FailureCause) {
        let node = self.node(id);
        if node.state.finish(ServiceState::Failed).is_none() {
            return;
        }
        let _ = node.failure.set(cause.clone());
        warn!(service = %node.key, %from, error = %cause, "Service failed");

        self.events.failure(&ServiceFailure {
            service: node.key.clone(),
            from,
            cause,
            failed_at: Utc::now(),
        });
        self.state_changed();
    }

    /// Fire graph-level notifications for the current states
    pub(crate) fn state_changed(&self) {
        if self.all(|state| state == ServiceState::Running) {
            self.events.healthy();
        }
        if self.all(ServiceState::is_terminal) {
            self.events.stopped();
        }
        self.events.wake();
    }

    pub(crate) fn all(&self, predicate: impl Fn(ServiceState) -> bool) -> bool {
        self.nodes.iter().all(|node| predicate(node.state()))
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
