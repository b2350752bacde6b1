//! Normalization of Flower API payloads into gauge samples.
//!
//! Flower exposes queue information in several shapes depending on the
//! endpoint. Each [`Variant`] knows which endpoint to poll and how to turn
//! its JSON into [`Sample`]s labelled with the target they came from. The
//! variant is fixed by configuration; payloads are never sniffed.

pub mod queue_length;
pub mod queue_state;
pub mod worker_totals;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::{Sample, SeriesKey, TARGET_LABEL};

/// Upstream payload shape.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Message count per broker queue (`/api/queues/length`).
    #[default]
    QueueLength,
    /// Tasks per queue and state, resolved through routing keys (`/api/workers`).
    QueueState,
    /// Cumulative processed tasks per worker and task name (`/api/workers`).
    WorkerTotals,
}

impl Variant {
    /// Upstream path polled for this variant.
    pub fn path(&self) -> &'static str {
        match self {
            Variant::QueueLength => "/api/queues/length",
            Variant::QueueState | Variant::WorkerTotals => "/api/workers",
        }
    }

    /// Metric names emitted by this variant, with their HELP text.
    pub fn metrics(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Variant::QueueLength => queue_length::METRICS,
            Variant::QueueState => queue_state::METRICS,
            Variant::WorkerTotals => worker_totals::METRICS,
        }
    }

    /// Convert one payload from `target` into a complete batch of samples.
    pub fn normalize(&self, target: &str, payload: &Value) -> Vec<Sample> {
        match self {
            Variant::QueueLength => queue_length::normalize(target, payload),
            Variant::QueueState => queue_state::normalize(target, payload),
            Variant::WorkerTotals => worker_totals::normalize(target, payload),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::QueueLength => "queue_length",
            Variant::QueueState => "queue_state",
            Variant::WorkerTotals => "worker_totals",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Series key for `name` carrying the target label.
pub(crate) fn target_key(name: &str, target: &str) -> SeriesKey {
    SeriesKey::new(name).with_label(TARGET_LABEL, target)
}
