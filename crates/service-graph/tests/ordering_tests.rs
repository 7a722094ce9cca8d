//! Start and stop ordering across dependency and enhancement edges

mod common;

use common::{EventLog, instant, manual, position};
use service_graph::{GraphRegistry, ServiceState};

#[test]
fn test_dependency_chain_starts_in_order() {
    common::init_tracing();
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    // Registered out of order on purpose
    instant(&mut registry, "c", &log);
    instant(&mut registry, "a", &log);
    instant(&mut registry, "b", &log);
    registry.declare_dependency("c", "b");
    registry.declare_dependency("b", "a");

    let graph = registry.validate_and_link().unwrap();
    graph.start_async();

    assert_eq!(log.starts(), vec!["a", "b", "c"]);
    assert!(graph.is_healthy());

    graph.stop_async();
    assert_eq!(log.stops(), vec!["c", "b", "a"]);
    assert!(graph.is_stopped());
}

#[test]
fn test_dependent_waits_for_running_not_starting() {
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    let db = manual(&mut registry, "db", &log);
    instant(&mut registry, "api", &log);
    registry.declare_dependency("api", "db");

    let graph = registry.validate_and_link().unwrap();
    graph.start_async();

    assert_eq!(log.starts(), vec!["db"]);
    assert_eq!(graph.state_of(&"db"), Some(ServiceState::Starting));
    assert_eq!(graph.state_of(&"api"), Some(ServiceState::Starting));

    db.finish_start();
    assert_eq!(log.starts(), vec!["db", "api"]);
    assert!(graph.is_healthy());
}

#[test]
fn test_enhancement_runs_before_dependents_of_target() {
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    let d = manual(&mut registry, "d", &log);
    let e = manual(&mut registry, "e", &log);
    let f = manual(&mut registry, "f", &log);
    registry.declare_enhancement("d", "e").unwrap();
    // f says nothing about e
    registry.declare_dependency("f", "d");

    let graph = registry.validate_and_link().unwrap();
    graph.start_async();
    assert_eq!(log.starts(), vec!["d"]);

    d.finish_start();
    assert_eq!(log.starts(), vec!["d", "e"]);

    e.finish_start();
    assert_eq!(log.starts(), vec!["d", "e", "f"]);

    f.finish_start();
    assert!(graph.is_healthy());

    graph.stop_async();
    assert_eq!(log.stops(), vec!["f"]);
    f.finish_stop();
    assert_eq!(log.stops(), vec!["f", "e"]);
    e.finish_stop();
    assert_eq!(log.stops(), vec!["f", "e", "d"]);
    d.finish_stop();
    assert!(graph.is_stopped());
}

#[test]
fn test_db_migrate_api() {
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    instant(&mut registry, "api", &log);
    instant(&mut registry, "migrate", &log);
    instant(&mut registry, "db", &log);
    registry.declare_enhancement("db", "migrate").unwrap();
    registry.declare_dependency("api", "db");

    let graph = registry.validate_and_link().unwrap();
    assert_eq!(graph.upstream_of(&"api"), Some(vec!["migrate", "db"]));

    graph.start_async();
    graph.stop_async();

    assert_eq!(
        log.entries(),
        vec![
            "start:db",
            "start:migrate",
            "start:api",
            "stop:api",
            "stop:migrate",
            "stop:db",
        ]
    );
}

#[test]
fn test_stop_order_mirrors_start_order() {
    // Diamond with an enhancement on one side:
    //   base <- left <- top
    //   base <- right <- top, warm enhances right
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    for name in ["top", "left", "right", "warm", "base", "lone"] {
        instant(&mut registry, name, &log);
    }
    registry.declare_dependency("left", "base");
    registry.declare_dependency("right", "base");
    registry.declare_dependency("top", "left");
    registry.declare_dependency("top", "right");
    registry.declare_enhancement("right", "warm").unwrap();

    let graph = registry.validate_and_link().unwrap();
    graph.start_async();
    graph.stop_async();

    let starts = log.starts();
    let stops = log.stops();
    assert_eq!(starts.len(), 6);
    assert_eq!(stops.len(), 6);

    for name in graph.keys() {
        for upstream in graph.upstream_of(&name).unwrap() {
            assert!(
                position(&starts, upstream) < position(&starts, name),
                "{upstream} must start before {name}"
            );
            assert!(
                position(&stops, name) < position(&stops, upstream),
                "{name} must stop before {upstream}"
            );
        }
    }
}

#[test]
fn test_startup_plan_levels() {
    let log = EventLog::new();
    let mut registry = GraphRegistry::new();
    for name in ["db", "cache", "migrate", "api", "worker"] {
        instant(&mut registry, name, &log);
    }
    registry.declare_enhancement("db", "migrate").unwrap();
    registry.declare_dependency("api", "db");
    registry.declare_dependency("api", "cache");
    registry.declare_dependency("worker", "api");

    let graph = registry.validate_and_link().unwrap();
    assert_eq!(
        graph.startup_plan(),
        vec![
            vec!["db", "cache"],
            vec!["migrate"],
            vec!["api"],
            vec!["worker"],
        ]
    );
    assert_eq!(graph.shutdown_plan().first(), Some(&vec!["worker"]));

    // Planning never builds or starts anything
    assert!(log.entries().is_empty());
}
