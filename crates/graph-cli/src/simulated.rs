//! Timer-backed stand-ins for the services of a manifest

use async_trait::async_trait;
use graph_config::ServiceSpec;
use service_graph::{AsyncLifecycle, AsyncService, SmolSpawner};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

struct Simulated {
    name: String,
    spec: ServiceSpec,
}

#[async_trait]
impl AsyncLifecycle for Simulated {
    async fn start_up(&self) -> anyhow::Result<()> {
        debug!(service = %self.name, delay_ms = self.spec.start_delay_ms, "Simulating startup");
        smol::Timer::after(Duration::from_millis(self.spec.start_delay_ms)).await;
        if let Some(message) = &self.spec.fail_on_start {
            anyhow::bail!("{message}");
        }
        Ok(())
    }

    async fn shut_down(&self) -> anyhow::Result<()> {
        debug!(service = %self.name, delay_ms = self.spec.stop_delay_ms, "Simulating shutdown");
        smol::Timer::after(Duration::from_millis(self.spec.stop_delay_ms)).await;
        Ok(())
    }
}

/// Build the simulated service for one manifest entry
pub fn service(name: &str, spec: &ServiceSpec) -> AsyncService {
    let lifecycle = Simulated {
        name: name.to_string(),
        spec: spec.clone(),
    };
    AsyncService::new(name, lifecycle, Arc::new(SmolSpawner))
}
