use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, Table};
use service_graph::{Listener, ServiceGraph, ServiceState};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info};

/// Order in which services were told to start and stop
#[derive(Default)]
struct Observed {
    started: Vec<String>,
    stopped: Vec<String>,
}

struct Recorder {
    key: String,
    observed: Arc<Mutex<Observed>>,
}

impl Recorder {
    fn observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Start and stop events fire before the lifecycle runs, so the recorded
// order is the order the graph issued them in
impl Listener for Recorder {
    fn starting(&self) {
        self.observed().started.push(self.key.clone());
    }

    fn stopping(&self, _from: ServiceState) {
        self.observed().stopped.push(self.key.clone());
    }
}

pub async fn run(manifest_path: &Path, hold_ms: u64, shutdown_timeout: u64) -> Result<()> {
    let (name, graph) = super::load(manifest_path)?;

    let observed = Arc::new(Mutex::new(Observed::default()));
    for key in graph.keys() {
        if let Some(service) = graph.service(&key) {
            service.add_listener(Arc::new(Recorder {
                key,
                observed: observed.clone(),
            }));
        }
    }
    graph.add_failure_listener(|failure| {
        error!(
            service = %failure.service,
            from = %failure.from,
            at = %failure.failed_at,
            error = %failure.cause,
            "Service failed"
        );
    });

    info!(graph = %name, services = graph.len(), "Starting service graph");
    graph.start_async();
    let healthy = graph.await_healthy().await;
    match &healthy {
        Ok(()) => println!("✓ All {} services running", graph.len()),
        Err(e) => println!("✗ {}", e),
    }

    if healthy.is_ok() && hold_ms > 0 {
        smol::Timer::after(Duration::from_millis(hold_ms)).await;
    }

    info!(graph = %name, "Stopping service graph");
    graph.stop_async();
    let stopped = smol::future::or(
        async {
            graph.await_stopped().await;
            true
        },
        async {
            smol::Timer::after(Duration::from_secs(shutdown_timeout)).await;
            false
        },
    )
    .await;

    {
        let observed = observed.lock().unwrap_or_else(PoisonError::into_inner);
        println!("Start order: {}", observed.started.join(", "));
        println!("Stop order: {}", observed.stopped.join(", "));
    }
    print_states(&graph);

    if !stopped {
        let stalled: Vec<String> = graph
            .states()
            .into_iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(key, _)| key)
            .collect();
        bail!(
            "Shutdown timed out after {}s, still running: {}",
            shutdown_timeout,
            stalled.join(", ")
        );
    }

    healthy.context("Service graph did not become healthy")
}

fn print_states(graph: &ServiceGraph<String>) {
    let mut table = Table::new();
    table.set_header(vec!["SERVICE", "STATE"]);

    for (key, state) in graph.states() {
        let color = match state {
            ServiceState::Terminated => Color::DarkGrey,
            ServiceState::Running => Color::Green,
            ServiceState::Failed => Color::Red,
            _ => Color::Yellow,
        };
        table.add_row(vec![Cell::new(key), Cell::new(state).fg(color)]);
    }

    println!("{}", table);
}
