use anyhow::Result;
use comfy_table::Table;
use std::path::Path;

pub async fn run(manifest_path: &Path) -> Result<()> {
    let (name, graph) = super::load(manifest_path)?;
    let plan = graph.startup_plan();

    println!("Plan for {}", name);
    println!();
    println!("Start levels:");
    for (level, services) in plan.iter().enumerate() {
        println!("  {}: {}", level, services.join(", "));
    }
    println!();
    println!("Stop levels:");
    for (level, services) in graph.shutdown_plan().iter().enumerate() {
        println!("  {}: {}", level, services.join(", "));
    }
    println!();

    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "LEVEL", "WAITS FOR", "STOPS AFTER"]);

    for key in graph.keys() {
        let level = plan
            .iter()
            .position(|services| services.contains(&key))
            .map(|level| level.to_string())
            .unwrap_or_else(|| "-".to_string());
        let upstream = graph.upstream_of(&key).unwrap_or_default();
        let downstream = graph.downstream_of(&key).unwrap_or_default();

        table.add_row(vec![
            key.clone(),
            level,
            or_dash(&upstream),
            or_dash(&downstream),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn or_dash(keys: &[String]) -> String {
    if keys.is_empty() {
        "-".to_string()
    } else {
        keys.join(", ")
    }
}
