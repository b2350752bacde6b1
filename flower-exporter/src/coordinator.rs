//! Starts one poller per target and supervises them.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::FlowerClient;
use crate::config::FlowerConfig;
use crate::poller::{Poller, StopReason};
use crate::registry::SharedRegistry;
use crate::status::SharedStatusBoard;

/// Owns the poller tasks of every configured target.
///
/// Targets are independent: a poller that stops never affects the others.
pub struct Coordinator {
    tasks: Vec<(String, JoinHandle<StopReason>)>,
    status: SharedStatusBoard,
}

impl Coordinator {
    /// Spawn a poller for every target in `config`.
    pub fn start(
        config: &FlowerConfig,
        registry: SharedRegistry,
        status: SharedStatusBoard,
        shutdown: watch::Receiver<bool>,
    ) -> reqwest::Result<Self> {
        for (name, help) in config.variant.metrics() {
            registry.describe(*name, *help);
        }

        let client = FlowerClient::new(config.request_timeout(), config.connect_timeout())?;
        let mut tasks = Vec::new();

        for target in config.normalized_targets() {
            let poller = Poller::new(
                target.clone(),
                config,
                client.clone(),
                registry.clone(),
                status.clone(),
            );

            info!(flower = %target, path = config.variant.path(), "Spawning poller");
            tasks.push((target, tokio::spawn(poller.run(shutdown.clone()))));
        }

        info!(
            targets = tasks.len(),
            variant = %config.variant,
            "Flower coordinator started"
        );

        Ok(Self { tasks, status })
    }

    /// Number of spawned pollers.
    pub fn target_count(&self) -> usize {
        self.tasks.len()
    }

    /// At least one target is being polled successfully.
    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Wait until every poller has returned.
    pub async fn join(self) -> Vec<(String, StopReason)> {
        let mut results = Vec::with_capacity(self.tasks.len());

        for (target, handle) in self.tasks {
            let reason = match handle.await {
                Ok(reason) => reason,
                Err(e) => {
                    error!(flower = %target, error = %e, "Poller task failed");
                    self.status.update(&target, |s| s.mark_stopped());
                    StopReason::Crashed
                }
            };
            results.push((target, reason));
        }

        results
    }
}
