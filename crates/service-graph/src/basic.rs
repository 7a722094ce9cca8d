//! A reusable implementation of the [`Service`] state machine.
//!
//! [`BasicService`] owns the state, validates transitions and dispatches
//! listener callbacks. The actual work lives in a [`Lifecycle`], which is
//! handed a [`ServiceControl`] to report when startup or shutdown finished.

use crate::{
    Error, Result,
    service::{FailureCause, Listener, Service},
    state::ServiceState,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// The work behind a [`BasicService`]
///
/// Both hooks are called without any lock held and may report completion
/// synchronously or later from another thread.
pub trait Lifecycle: Send + Sync + 'static {
    /// Begin startup, then call [`ServiceControl::notify_started`] or
    /// [`ServiceControl::notify_failed`]
    fn do_start(&self, control: ServiceControl);

    /// Begin shutdown, then call [`ServiceControl::notify_stopped`] or
    /// [`ServiceControl::notify_failed`]
    fn do_stop(&self, control: ServiceControl);
}

/// Handle used by a [`Lifecycle`] to report progress
#[derive(Clone)]
pub struct ServiceControl {
    inner: Weak<Inner>,
}

/// Transition to deliver to listeners once the state lock is released
enum Event {
    Starting,
    Running,
    Stopping(ServiceState),
    Terminated(ServiceState),
    Failed(ServiceState, FailureCause),
}

struct Machine {
    state: ServiceState,
    /// Stop was requested while starting
    stop_requested: bool,
    failure: Option<FailureCause>,
}

struct Inner {
    name: String,
    machine: Mutex<Machine>,
    listeners: Mutex<Vec<Arc<dyn Listener>>>,
    lifecycle: Arc<dyn Lifecycle>,
}

/// Service state machine driven by a [`Lifecycle`]
pub struct BasicService {
    inner: Arc<Inner>,
}

impl BasicService {
    /// Create a service in the NEW state
    pub fn new(name: impl Into<String>, lifecycle: impl Lifecycle) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                machine: Mutex::new(Machine {
                    state: ServiceState::New,
                    stop_requested: false,
                    failure: None,
                }),
                listeners: Mutex::new(Vec::new()),
                lifecycle: Arc::new(lifecycle),
            }),
        }
    }

    /// Service name, used in logs
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Cause of the failure, if the service failed
    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.inner.machine().failure.clone()
    }

    /// Handle for reporting progress from outside the lifecycle hooks
    pub fn control(&self) -> ServiceControl {
        ServiceControl {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Service for BasicService {
    fn state(&self) -> ServiceState {
        self.inner.machine().state
    }

    fn start(&self) -> Result<()> {
        {
            let mut machine = self.inner.machine();
            if machine.state != ServiceState::New {
                return Err(Error::InvalidStateTransition {
                    from: machine.state,
                    to: ServiceState::Starting,
                });
            }
            machine.state = ServiceState::Starting;
        }
        debug!(service = %self.inner.name, "Service starting");
        self.inner.dispatch(vec![Event::Starting]);
        self.inner.lifecycle.do_start(self.control());
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let events = {
            let mut machine = self.inner.machine();
            match machine.state {
                ServiceState::New => {
                    machine.state = ServiceState::Terminated;
                    vec![Event::Terminated(ServiceState::New)]
                }
                ServiceState::Starting => {
                    machine.stop_requested = true;
                    Vec::new()
                }
                ServiceState::Running => {
                    machine.state = ServiceState::Stopping;
                    vec![Event::Stopping(ServiceState::Running)]
                }
                _ => Vec::new(),
            }
        };

        let begin_shutdown = matches!(events.first(), Some(Event::Stopping(_)));
        self.inner.dispatch(events);
        if begin_shutdown {
            debug!(service = %self.inner.name, "Service stopping");
            self.inner.lifecycle.do_stop(self.control());
        }
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn Listener>) {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

impl fmt::Debug for BasicService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicService")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ServiceControl {
    /// Current state of the service, `None` once it has been dropped
    pub fn state(&self) -> Option<ServiceState> {
        self.inner.upgrade().map(|inner| inner.machine().state)
    }

    /// Startup finished, the service is RUNNING
    pub fn notify_started(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let (events, stop_now) = {
            let mut machine = inner.machine();
            if machine.state != ServiceState::Starting {
                warn!(service = %inner.name, state = %machine.state, "Ignoring start notification");
                return;
            }
            machine.state = ServiceState::Running;
            if machine.stop_requested {
                machine.state = ServiceState::Stopping;
                (
                    vec![Event::Running, Event::Stopping(ServiceState::Running)],
                    true,
                )
            } else {
                (vec![Event::Running], false)
            }
        };

        debug!(service = %inner.name, "Service running");
        inner.dispatch(events);
        if stop_now {
            inner.lifecycle.do_stop(self.clone());
        }
    }

    /// Shutdown finished, the service is TERMINATED
    pub fn notify_stopped(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let from = {
            let mut machine = inner.machine();
            let from = machine.state;
            if !from.can_transition_to(ServiceState::Terminated) || from == ServiceState::New {
                warn!(service = %inner.name, state = %from, "Ignoring stop notification");
                return;
            }
            machine.state = ServiceState::Terminated;
            from
        };

        debug!(service = %inner.name, "Service terminated");
        inner.dispatch(vec![Event::Terminated(from)]);
    }

    /// The service failed with `cause`
    pub fn notify_failed(&self, cause: impl Into<anyhow::Error>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let cause: FailureCause = Arc::new(cause.into());
        let from = {
            let mut machine = inner.machine();
            let from = machine.state;
            if from.is_terminal() {
                warn!(service = %inner.name, state = %from, error = %cause, "Ignoring failure of finished service");
                return;
            }
            machine.state = ServiceState::Failed;
            machine.failure = Some(cause.clone());
            from
        };

        warn!(service = %inner.name, error = %cause, "Service failed");
        inner.dispatch(vec![Event::Failed(from, cause)]);
    }
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for event in events {
            for listener in &listeners {
                match &event {
                    Event::Starting => listener.starting(),
                    Event::Running => listener.running(),
                    Event::Stopping(from) => listener.stopping(*from),
                    Event::Terminated(from) => listener.terminated(*from),
                    Event::Failed(from, cause) => listener.failed(*from, cause.clone()),
                }
            }
        }
    }
}
