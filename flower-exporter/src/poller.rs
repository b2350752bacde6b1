//! Per-target polling loop.

use std::time::Duration;

use flower_exporter_common::current_timestamp_millis;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::{FetchError, FlowerClient};
use crate::config::{FlowerConfig, UnreachablePolicy};
use crate::normalize::Variant;
use crate::registry::{SharedRegistry, TARGET_LABEL};
use crate::status::SharedStatusBoard;

/// Why a poller returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopReason {
    /// The target could not be reached; it is abandoned.
    Unreachable,
    /// The shutdown signal was received.
    Shutdown,
    /// The poller task ended abnormally.
    Crashed,
}

/// A poller for a single Flower target.
///
/// Polls are strictly sequential. Transient failures are retried forever;
/// a connection failure ends the poller for the rest of the process.
pub struct Poller {
    target: String,
    variant: Variant,
    client: FlowerClient,
    registry: SharedRegistry,
    status: SharedStatusBoard,
    interval: Duration,
    on_unreachable: UnreachablePolicy,
}

impl Poller {
    /// Create a poller and register its target as `Starting`.
    pub fn new(
        target: impl Into<String>,
        config: &FlowerConfig,
        client: FlowerClient,
        registry: SharedRegistry,
        status: SharedStatusBoard,
    ) -> Self {
        let target = target.into();
        status.register(&target);

        Self {
            target,
            variant: config.variant,
            client,
            registry,
            status,
            interval: config.poll_interval(),
            on_unreachable: config.on_unreachable,
        }
    }

    /// Run the polling loop until the target is unreachable or shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> StopReason {
        info!(
            flower = %self.target,
            variant = %self.variant,
            interval_ms = self.interval.as_millis() as u64,
            "Starting Flower poller"
        );

        loop {
            let outcome = tokio::select! {
                result = self.poll_once() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            match outcome {
                Ok(count) => {
                    self.status
                        .update(&self.target, |s| s.record_success(current_timestamp_millis()));
                    debug!(flower = %self.target, series = count, "Poll succeeded");
                }
                Err(e) if e.is_permanent() => {
                    error!(
                        flower = %self.target,
                        error = %e,
                        "Flower target unreachable, stopping poller"
                    );
                    self.status
                        .update(&self.target, |s| s.record_failure(e.to_string(), true));
                    if self.on_unreachable == UnreachablePolicy::Zero {
                        let zeroed = self.registry.zero_all_known(TARGET_LABEL, &self.target);
                        warn!(flower = %self.target, zeroed, "Zeroed series of unreachable target");
                    }
                    return StopReason::Unreachable;
                }
                Err(e) => {
                    error!(flower = %self.target, error = %e, "Poll failed, retrying");
                    self.status
                        .update(&self.target, |s| s.record_failure(e.to_string(), false));
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.status.update(&self.target, |s| s.mark_stopped());
        info!(flower = %self.target, "Flower poller stopped");
        StopReason::Shutdown
    }

    /// Perform a single poll cycle.
    ///
    /// On success every known series of this target is replaced by the new
    /// batch; series missing from it read zero.
    pub async fn poll_once(&self) -> Result<usize, FetchError> {
        let payload = self.client.fetch(&self.target, self.variant.path()).await?;
        let samples = self.variant.normalize(&self.target, &payload);
        Ok(self.registry.apply(TARGET_LABEL, &self.target, samples))
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
