//! Common test utilities for service graph integration tests

#![allow(dead_code)]

use service_graph::{BasicService, GraphRegistry, Lifecycle, ServiceControl};
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered record of lifecycle calls shared by every service in a test
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Snapshot of all entries
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Entries starting with `prefix`, prefix stripped
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(prefix))
            .map(str::to_string)
            .collect()
    }

    /// Names of started services, in order
    pub fn starts(&self) -> Vec<String> {
        self.with_prefix("start:")
    }

    /// Names of stopped services, in order
    pub fn stops(&self) -> Vec<String> {
        self.with_prefix("stop:")
    }

    /// How often `entry` was recorded
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|e| *e == entry).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Lifecycle that records calls and completes each phase immediately
pub struct Instant {
    name: &'static str,
    log: EventLog,
}

impl Instant {
    /// Lifecycle for `name` recording into `log`
    pub fn new(name: &'static str, log: &EventLog) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }
}

impl Lifecycle for Instant {
    fn do_start(&self, control: ServiceControl) {
        self.log.push(format!("start:{}", self.name));
        control.notify_started();
    }

    fn do_stop(&self, control: ServiceControl) {
        self.log.push(format!("stop:{}", self.name));
        control.notify_stopped();
    }
}

/// Lifecycle that records calls and waits for the test to complete each phase
struct Manual {
    name: &'static str,
    log: EventLog,
    control: Arc<Mutex<Option<ServiceControl>>>,
}

impl Lifecycle for Manual {
    fn do_start(&self, control: ServiceControl) {
        self.log.push(format!("start:{}", self.name));
        *self.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(control);
    }

    fn do_stop(&self, control: ServiceControl) {
        self.log.push(format!("stop:{}", self.name));
        *self.control.lock().unwrap_or_else(PoisonError::into_inner) = Some(control);
    }
}

/// Test-side handle to a manually driven service
#[derive(Clone)]
pub struct ManualHandle {
    name: &'static str,
    control: Arc<Mutex<Option<ServiceControl>>>,
}

impl ManualHandle {
    fn control(&self) -> ServiceControl {
        self.control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| panic!("{} was never started or stopped", self.name))
    }

    /// Report that startup finished
    pub fn finish_start(&self) {
        self.control().notify_started();
    }

    /// Report that shutdown finished
    pub fn finish_stop(&self) {
        self.control().notify_stopped();
    }

    /// Report a failure
    pub fn fail(&self, message: &str) {
        self.control().notify_failed(anyhow::anyhow!(message.to_string()));
    }
}

/// Register a service that completes every phase immediately
pub fn instant(registry: &mut GraphRegistry<&'static str>, name: &'static str, log: &EventLog) {
    let lifecycle = Instant::new(name, log);
    registry
        .register(name, move || BasicService::new(name, lifecycle))
        .unwrap();
}

/// Register a service whose phases are completed through the returned handle
pub fn manual(
    registry: &mut GraphRegistry<&'static str>,
    name: &'static str,
    log: &EventLog,
) -> ManualHandle {
    let control = Arc::new(Mutex::new(None));
    let lifecycle = Manual {
        name,
        log: log.clone(),
        control: control.clone(),
    };
    registry
        .register(name, move || BasicService::new(name, lifecycle))
        .unwrap();
    ManualHandle { name, control }
}

/// Position of `name` in `order`
pub fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|entry| entry == name)
        .unwrap_or_else(|| panic!("{name} not found in {order:?}"))
}

/// Install a test subscriber once, ignoring repeated calls
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_target(false)
        .try_init();
}
