//! Declarative registration and linking.

use crate::{
    Error, Result,
    coordinated::{Coordinator, NodeId},
    graph::ServiceGraph,
    service::{Service, ServiceFactory, ServiceKey},
};
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Collects services and edges, then links them into a [`ServiceGraph`]
///
/// Edges may be declared before either endpoint is registered. Referential
/// integrity and acyclicity are checked once, by
/// [`validate_and_link`](Self::validate_and_link).
pub struct GraphRegistry<K: ServiceKey> {
    services: IndexMap<K, ServiceFactory>,
    /// (dependent, depends_on) in declaration order
    dependencies: Vec<(K, K)>,
    /// enhancement -> target
    enhancements: IndexMap<K, K>,
}

impl<K: ServiceKey> Default for GraphRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ServiceKey> GraphRegistry<K> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            services: IndexMap::new(),
            dependencies: Vec::new(),
            enhancements: IndexMap::new(),
        }
    }

    /// Register a service built lazily by `factory`
    ///
    /// The factory runs at most once, the first time the graph needs the
    /// service.
    pub fn register<S, F>(&mut self, key: K, factory: F) -> Result<()>
    where
        S: Service + 'static,
        F: FnOnce() -> S + Send + 'static,
    {
        self.insert(key, Box::new(move || Arc::new(factory()) as Arc<dyn Service>))
    }

    /// Register an already built service
    pub fn register_shared(&mut self, key: K, service: Arc<dyn Service>) -> Result<()> {
        self.insert(key, Box::new(move || service))
    }

    fn insert(&mut self, key: K, factory: ServiceFactory) -> Result<()> {
        if self.services.contains_key(&key) {
            return Err(Error::DuplicateRegistration(key.to_string()));
        }
        debug!(service = %key, "Service registered");
        self.services.insert(key, factory);
        Ok(())
    }

    /// `dependent` starts only after `depends_on` is RUNNING
    pub fn declare_dependency(&mut self, dependent: K, depends_on: K) {
        self.dependencies.push((dependent, depends_on));
    }

    /// `enhancement` starts after `target` and before every dependent of
    /// `target`
    ///
    /// A service enhances at most one target. Declaring the same pair twice
    /// is allowed.
    pub fn declare_enhancement(&mut self, target: K, enhancement: K) -> Result<()> {
        if let Some(existing) = self.enhancements.get(&enhancement) {
            if *existing != target {
                return Err(Error::EnhancementConflict {
                    enhancement: enhancement.to_string(),
                    existing: existing.to_string(),
                    requested: target.to_string(),
                });
            }
            return Ok(());
        }
        self.enhancements.insert(enhancement, target);
        Ok(())
    }

    /// Number of registered services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Check every edge, link the graph and reject cycles
    pub fn validate_and_link(self) -> Result<ServiceGraph<K>> {
        self.check_references()?;

        let id_of = |key: &K| self.services.get_index_of(key).map(NodeId);
        let mut enhancements: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
        for (enhancement, target) in &self.enhancements {
            if let (Some(enhancement), Some(target)) = (id_of(enhancement), id_of(target)) {
                enhancements.entry(target).or_default().push(enhancement);
            }
        }
        let dependencies: Vec<(NodeId, NodeId)> = self
            .dependencies
            .iter()
            .filter_map(|(dependent, depends_on)| Some((id_of(dependent)?, id_of(depends_on)?)))
            .collect();

        let core = Coordinator::new(self.services.into_iter().collect());

        // Enhancements first, upstream sets are built from them
        for (target, members) in enhancements {
            core.add_enhancements(target, &members)?;
        }
        for (dependent, depends_on) in dependencies {
            core.add_dependent_services(depends_on, &[dependent])?;
        }

        if let Some(path) = core.find_cycle() {
            return Err(Error::Cycle {
                path: core.keys_of(&path).iter().map(ToString::to_string).collect(),
            });
        }

        info!(services = core.ids().count(), "Service graph validated");
        Ok(ServiceGraph::new(core))
    }

    /// First unregistered key in declaration order, with everything that
    /// references it
    fn check_references(&self) -> Result<()> {
        let edges = self
            .dependencies
            .iter()
            .map(|(dependent, depends_on)| (dependent, depends_on))
            .chain(
                self.enhancements
                    .iter()
                    .map(|(enhancement, target)| (enhancement, target)),
            );

        let mut missing: IndexMap<&K, Vec<String>> = IndexMap::new();
        for (a, b) in edges {
            for (key, other) in [(a, b), (b, a)] {
                if !self.services.contains_key(key) {
                    missing.entry(key).or_default().push(other.to_string());
                }
            }
        }

        match missing.into_iter().next() {
            Some((key, mut referenced_by)) => {
                referenced_by.sort();
                referenced_by.dedup();
                Err(Error::MissingReference {
                    key: key.to_string(),
                    referenced_by,
                })
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{BasicService, Lifecycle, ServiceControl};
    use crate::state::ServiceState;

    struct Idle;

    impl Lifecycle for Idle {
        fn do_start(&self, _control: ServiceControl) {}
        fn do_stop(&self, _control: ServiceControl) {}
    }

    fn registry(keys: &[&'static str]) -> GraphRegistry<&'static str> {
        let mut registry = GraphRegistry::new();
        for &key in keys {
            registry
                .register(key, move || BasicService::new(key, Idle))
                .unwrap();
        }
        registry
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = registry(&["db"]);
        let err = registry
            .register("db", || BasicService::new("db", Idle))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateRegistration(ref key) if key == "db"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_shared() {
        let service: Arc<dyn Service> = Arc::new(BasicService::new("db", Idle));
        let mut registry = GraphRegistry::new();
        registry.register_shared("db", service.clone()).unwrap();
        assert!(matches!(
            registry.register_shared("db", service.clone()),
            Err(Error::DuplicateRegistration(_))
        ));

        let graph = registry.validate_and_link().unwrap();
        assert!(Arc::ptr_eq(&graph.service(&"db").unwrap(), &service));
    }

    #[test]
    fn test_enhancement_conflict_is_immediate() {
        let mut registry = GraphRegistry::<&str>::new();
        registry.declare_enhancement("db", "warmup").unwrap();
        registry.declare_enhancement("db", "warmup").unwrap();

        let err = registry.declare_enhancement("cache", "warmup").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Service 'warmup' already enhances 'db', cannot also enhance 'cache'"
        );
    }

    #[test]
    fn test_edges_may_precede_registration() {
        let mut registry = GraphRegistry::new();
        registry.declare_dependency("api", "db");
        registry
            .register("api", || BasicService::new("api", Idle))
            .unwrap();
        registry
            .register("db", || BasicService::new("db", Idle))
            .unwrap();

        let graph = registry.validate_and_link().unwrap();
        assert_eq!(graph.upstream_of(&"api"), Some(vec!["db"]));
        assert_eq!(graph.dependents_of(&"db"), Some(vec!["api"]));
    }

    #[test]
    fn test_missing_reference_names_key_and_referrers() {
        let mut registry = registry(&["api", "worker"]);
        registry.declare_dependency("api", "db");
        registry.declare_dependency("worker", "db");
        registry.declare_dependency("worker", "db");

        let err = registry.validate_and_link().unwrap_err();
        match err {
            Error::MissingReference { key, referenced_by } => {
                assert_eq!(key, "db");
                assert_eq!(referenced_by, vec!["api", "worker"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_enhancement_target() {
        let mut registry = registry(&["migrate"]);
        registry.declare_enhancement("db", "migrate").unwrap();

        let err = registry.validate_and_link().unwrap_err();
        assert!(matches!(err, Error::MissingReference { ref key, .. } if key == "db"));
    }

    #[test]
    fn test_enhancement_depending_on_its_target_links() {
        let mut registry = registry(&["db", "migrate", "api"]);
        registry.declare_enhancement("db", "migrate").unwrap();
        registry.declare_dependency("migrate", "db");
        registry.declare_dependency("api", "db");

        let graph = registry.validate_and_link().unwrap();
        assert_eq!(graph.upstream_of(&"migrate"), Some(vec!["db"]));
        assert_eq!(graph.upstream_of(&"api"), Some(vec!["db", "migrate"]));
        assert_eq!(
            graph.startup_plan(),
            vec![vec!["db"], vec!["migrate"], vec!["api"]]
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut registry = registry(&["a"]);
        registry.declare_dependency("a", "a");

        let err = registry.validate_and_link().unwrap_err();
        assert!(matches!(err, Error::Cycle { ref path } if path == &["a", "a"]));
    }

    #[test]
    fn test_linked_graph_is_new_and_builds_services_lazily() {
        let mut registry = GraphRegistry::new();
        let built = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = built.clone();
        registry
            .register("db", move || {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                BasicService::new("db", Idle)
            })
            .unwrap();

        let graph = registry.validate_and_link().unwrap();
        assert_eq!(graph.state_of(&"db"), Some(ServiceState::New));
        assert!(!built.load(std::sync::atomic::Ordering::SeqCst));

        assert!(graph.service(&"db").is_some());
        assert!(built.load(std::sync::atomic::Ordering::SeqCst));
    }
}
