//! End-to-end tests for the service-graph binary

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

const DEMO: &str = r#"
version: "1.0"
name: demo
services:
  api:
    depends_on: [db]
    start_delay_ms: 5
  migrate:
    enhances: db
    start_delay_ms: 20
  db:
    start_delay_ms: 30
    stop_delay_ms: 10
"#;

fn manifest(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn service_graph(args: &[&str], manifest: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_service-graph"))
        .args(args)
        .arg(manifest)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_validate_accepts_demo() {
    let file = manifest(DEMO);
    let output = service_graph(&["validate"], file.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Manifest valid"));
    assert!(out.contains("Services: 3"));
    assert!(out.contains("Start levels: 3"));
}

#[test]
fn test_validate_reports_cycle() {
    let file = manifest(
        r#"
version: "1.0"
services:
  a:
    depends_on: [b]
  b:
    depends_on: [a]
"#,
    );
    let output = service_graph(&["validate"], file.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Dependency cycle detected"));
}

#[test]
fn test_validate_reports_missing_service() {
    let file = manifest(
        r#"
version: "1.0"
services:
  api:
    depends_on: [db]
"#,
    );
    let output = service_graph(&["validate"], file.path());

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Service 'db' is not registered"));
}

#[test]
fn test_plan_lists_levels() {
    let file = manifest(DEMO);
    let output = service_graph(&["plan"], file.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("0: db"));
    assert!(out.contains("1: migrate"));
    assert!(out.contains("2: api"));
}

#[test]
fn test_run_starts_and_stops_in_order() {
    let file = manifest(DEMO);
    let output = service_graph(&["run", "--shutdown-timeout", "10"], file.path());

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("All 3 services running"));
    assert!(out.contains("Start order: db, migrate, api"));
    assert!(out.contains("Stop order: api, migrate, db"));
}

#[test]
fn test_run_reports_startup_failure() {
    let file = manifest(
        r#"
version: "1.0"
services:
  db:
    fail_on_start: "disk full"
  api:
    depends_on: [db]
"#,
    );
    let output = service_graph(&["run"], file.path());

    assert!(!output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Service 'db' failed: disk full"));
    // api was never started
    assert!(out.contains("Start order: db\n"));
    assert!(stderr(&output).contains("did not become healthy"));
}
