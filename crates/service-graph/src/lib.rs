//! # Service Graph
//!
//! Start and stop a set of services in dependency order.
//!
//! Services are registered under a key in a [`GraphRegistry`] together with
//! two kinds of edges:
//!
//! - a **dependency** (`api` depends on `db`): `api` starts after `db` is
//!   running and stops before `db` stops
//! - an **enhancement** (`migrate` enhances `db`): `migrate` starts after
//!   `db`, and every dependent of `db` also waits for `migrate` without
//!   declaring anything about it
//!
//! [`GraphRegistry::validate_and_link`] checks that every edge points at a
//! registered service and that the combined graph is acyclic, then hands
//! back a [`ServiceGraph`]. Its [`start_async`](ServiceGraph::start_async)
//! and [`stop_async`](ServiceGraph::stop_async) return immediately; each
//! service starts or stops on its own once its neighbours allow it, driven
//! by the state notifications of the services themselves.
//!
//! ## Example
//!
//! ```rust
//! use service_graph::{BasicService, GraphRegistry, Lifecycle, ServiceControl, ServiceState};
//!
//! struct Instant;
//!
//! impl Lifecycle for Instant {
//!     fn do_start(&self, control: ServiceControl) {
//!         control.notify_started();
//!     }
//!     fn do_stop(&self, control: ServiceControl) {
//!         control.notify_stopped();
//!     }
//! }
//!
//! # fn example() -> service_graph::Result<()> {
//! let mut registry = GraphRegistry::new();
//! for name in ["db", "migrate", "api"] {
//!     registry.register(name, move || BasicService::new(name, Instant))?;
//! }
//! registry.declare_enhancement("db", "migrate")?;
//! registry.declare_dependency("api", "db");
//!
//! let graph = registry.validate_and_link()?;
//! assert_eq!(graph.startup_plan(), vec![vec!["db"], vec!["migrate"], vec!["api"]]);
//!
//! graph.start_async();
//! assert!(graph.is_healthy());
//!
//! graph.stop_async();
//! assert_eq!(graph.state_of(&"db"), Some(ServiceState::Terminated));
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod async_service;
mod basic;
mod coordinated;
mod cycle;
mod error;
mod graph;
mod listener;
mod registry;
mod runtime;
mod service;
mod state;

pub use async_service::{AsyncLifecycle, AsyncService};
pub use basic::{BasicService, Lifecycle, ServiceControl};
pub use error::{Error, Result};
pub use graph::ServiceGraph;
pub use listener::{GraphListener, ServiceFailure};
pub use registry::GraphRegistry;
#[cfg(feature = "smol")]
pub use runtime::SmolSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
pub use runtime::{BoxedTask, Spawner};
pub use service::{FailureCause, Listener, Service, ServiceFactory, ServiceKey};
pub use state::ServiceState;
