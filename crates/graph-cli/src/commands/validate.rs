use anyhow::Result;
use std::path::Path;

pub async fn run(manifest_path: &Path) -> Result<()> {
    println!("Validating {}...", manifest_path.display());

    let (name, graph) = super::load(manifest_path)?;

    println!("✓ Manifest valid");
    println!("  Name: {}", name);
    println!("  Services: {}", graph.len());
    println!("  Start levels: {}", graph.startup_plan().len());

    Ok(())
}
