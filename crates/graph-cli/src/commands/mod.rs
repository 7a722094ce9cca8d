pub mod plan;
pub mod run;
pub mod validate;

use anyhow::{Context, Result};
use graph_config::parse_file;
use service_graph::ServiceGraph;
use std::path::Path;

/// Parse and link a manifest with simulated services
fn load(manifest_path: &Path) -> Result<(String, ServiceGraph<String>)> {
    let manifest = parse_file(manifest_path)
        .with_context(|| format!("Failed to parse {}", manifest_path.display()))?;
    let name = manifest.display_name().to_string();
    let graph = manifest
        .link(crate::simulated::service)
        .context("Invalid service graph")?;
    Ok((name, graph))
}
