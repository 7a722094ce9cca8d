//! Error types for the service graph

use crate::state::ServiceState;
use thiserror::Error;

/// Service graph error type
#[derive(Error, Debug)]
pub enum Error {
    /// A key was registered twice
    #[error("Service already registered: {0}")]
    DuplicateRegistration(String),

    /// An enhancement was declared against a second target
    #[error(
        "Service '{enhancement}' already enhances '{existing}', cannot also enhance '{requested}'"
    )]
    EnhancementConflict {
        /// The enhancement service
        enhancement: String,
        /// Target it already enhances
        existing: String,
        /// Target that was rejected
        requested: String,
    },

    /// The graph was mutated after a service left the NEW state
    #[error("Cannot change edges of '{service}' in state {state}, expected NEW")]
    NotNew {
        /// Service whose edges were being changed
        service: String,
        /// State it was in
        state: ServiceState,
    },

    /// An edge references a key that was never registered
    #[error("Service '{key}' is not registered but is referenced by: {}", referenced_by.join(", "))]
    MissingReference {
        /// The missing key
        key: String,
        /// Services that reference it
        referenced_by: Vec<String>,
    },

    /// The combined dependency and enhancement graph contains a cycle
    #[error("Dependency cycle detected: {}", path.join(" -> "))]
    Cycle {
        /// Services on the cycle, first and last entries are the same service
        path: Vec<String>,
    },

    /// Invalid service state transition
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        /// Current state
        from: ServiceState,
        /// Attempted state
        to: ServiceState,
    },

    /// A service failed while waiting on the graph
    #[error("Service '{service}' failed: {cause}")]
    ServiceFailed {
        /// Service that failed
        service: String,
        /// Failure message
        cause: String,
    },

    /// A service stopped before the graph became healthy
    #[error("Service '{service}' is {state}, the graph cannot become healthy")]
    Unhealthy {
        /// Service that stopped
        service: String,
        /// Its terminal state
        state: ServiceState,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
