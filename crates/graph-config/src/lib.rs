//! # Graph Configuration
//!
//! YAML manifests describing a service graph.
//!
//! A manifest lists services in the order they are registered, each with
//! the services it depends on and, optionally, the one service it enhances.
//! Timing fields are hints for whatever builds the concrete services.
//!
//! ```yaml
//! version: "1.0"
//! name: demo
//! services:
//!   db:
//!     start_delay_ms: 200
//!   migrate:
//!     enhances: db
//!   api:
//!     depends_on: [db]
//! ```

#![warn(missing_docs)]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use service_graph::{GraphRegistry, Service, ServiceGraph};
use std::sync::Arc;
use thiserror::Error;

pub mod parser;

pub use parser::{parse_file, parse_str};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read manifest file
    #[error("Failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid manifest
    #[error("Invalid manifest: {0}")]
    ValidationError(String),

    /// The declared graph was rejected
    #[error(transparent)]
    Graph(#[from] service_graph::Error),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root manifest structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version
    pub version: String,

    /// Optional graph name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Service definitions, in registration order
    #[serde(default)]
    pub services: IndexMap<String, ServiceSpec>,
}

/// One service in the manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Services that must be running before this one starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Service this one enhances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhances: Option<String>,

    /// Simulated startup time in milliseconds
    #[serde(default)]
    pub start_delay_ms: u64,

    /// Simulated shutdown time in milliseconds
    #[serde(default)]
    pub stop_delay_ms: u64,

    /// Fail startup with this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_on_start: Option<String>,
}

impl Manifest {
    /// Declare every service and edge in a fresh registry
    ///
    /// `build` turns a service definition into a concrete service. It runs
    /// lazily, once per service, the first time the graph needs it.
    /// Missing references and cycles are left to
    /// [`GraphRegistry::validate_and_link`].
    pub fn into_registry<S, F>(self, build: F) -> Result<GraphRegistry<String>>
    where
        S: Service + 'static,
        F: Fn(&str, &ServiceSpec) -> S + Send + Sync + 'static,
    {
        let build = Arc::new(build);
        let mut registry = GraphRegistry::new();

        for (name, spec) in &self.services {
            for dependency in &spec.depends_on {
                registry.declare_dependency(name.clone(), dependency.clone());
            }
            if let Some(target) = &spec.enhances {
                registry.declare_enhancement(target.clone(), name.clone())?;
            }
        }

        for (name, spec) in self.services {
            let build = build.clone();
            let key = name.clone();
            registry.register(name, move || build(&key, &spec))?;
        }

        Ok(registry)
    }

    /// Build, validate and link the graph in one step
    pub fn link<S, F>(self, build: F) -> Result<ServiceGraph<String>>
    where
        S: Service + 'static,
        F: Fn(&str, &ServiceSpec) -> S + Send + Sync + 'static,
    {
        Ok(self.into_registry(build)?.validate_and_link()?)
    }

    /// Display name of the manifest
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}
