//! Lifecycle states shared by services and their coordinators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a service
///
/// States only move forward (`New` → `Starting` → `Running` → `Stopping` →
/// `Terminated`), except `Failed` which can be entered from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ServiceState {
    /// Service has been created but not started
    New = 0,
    /// Service is starting up
    Starting = 1,
    /// Service is running
    Running = 2,
    /// Service is shutting down
    Stopping = 3,
    /// Service has stopped
    Terminated = 4,
    /// Service has failed
    Failed = 5,
}

impl ServiceState {
    /// Whether no further transition is possible from this state
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Terminated | ServiceState::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        match (self, next) {
            (New, Starting) | (Starting, Running) | (Running, Stopping) => true,
            (Stopping, Terminated) | (Running, Terminated) | (New, Terminated) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServiceState::New,
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            3 => ServiceState::Stopping,
            4 => ServiceState::Terminated,
            _ => ServiceState::Failed,
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::New => "NEW",
            ServiceState::Starting => "STARTING",
            ServiceState::Running => "RUNNING",
            ServiceState::Stopping => "STOPPING",
            ServiceState::Terminated => "TERMINATED",
            ServiceState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// A `ServiceState` that can be read and swapped without locking
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) fn new(state: ServiceState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ServiceState {
        ServiceState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `next` only if the current state is `current`
    pub(crate) fn transition(&self, current: ServiceState, next: ServiceState) -> bool {
        self.0
            .compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to the terminal state `next` from any non-terminal state,
    /// returning the previous state
    pub(crate) fn finish(&self, next: ServiceState) -> Option<ServiceState> {
        let mut current = self.load();
        loop {
            if current.is_terminal() {
                return None;
            }
            match self.0.compare_exchange(
                current as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = ServiceState::from_u8(actual),
            }
        }
    }
}
