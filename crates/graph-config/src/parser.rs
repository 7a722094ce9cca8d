//! Manifest parsing and structural validation

use crate::{ConfigError, Manifest, Result};
use std::path::Path;

/// Supported manifest version
pub const MANIFEST_VERSION: &str = "1.0";

/// Parse a YAML manifest file
pub fn parse_file(path: impl AsRef<Path>) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)?;
    parse_str(&content)
}

/// Parse a YAML manifest from a string
pub fn parse_str(content: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_yaml::from_str(content)?;
    validate_manifest(&manifest)?;
    Ok(manifest)
}

/// Checks that do not need the linked graph
fn validate_manifest(manifest: &Manifest) -> Result<()> {
    if manifest.version != MANIFEST_VERSION {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported version: {}, expected {}",
            manifest.version, MANIFEST_VERSION
        )));
    }

    for (name, spec) in &manifest.services {
        if name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Service names must not be empty".to_string(),
            ));
        }
        if spec.enhances.as_deref() == Some(name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Service '{}' cannot enhance itself",
                name
            )));
        }
    }

    Ok(())
}
