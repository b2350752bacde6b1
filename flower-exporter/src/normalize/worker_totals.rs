//! `/api/workers`: cumulative processed task counts per worker.

use serde_json::Value;
use tracing::debug;

use super::target_key;
use crate::registry::Sample;

pub const WORKER_TASKS: &str = "celery_worker_tasks";
pub const WORKER_TASKS_TOTAL: &str = "celery_worker_tasks_total";

pub const METRICS: &[(&str, &str)] = &[
    (WORKER_TASKS, "Tasks processed by a worker, per task name"),
    (WORKER_TASKS_TOTAL, "Tasks processed by a worker, all task names"),
];

pub fn normalize(target: &str, payload: &Value) -> Vec<Sample> {
    let Some(workers) = payload.as_object() else {
        debug!(flower = %target, "Workers payload is not an object");
        return Vec::new();
    };

    let mut samples = Vec::new();

    for (worker, info) in workers {
        let Some(totals) = info.pointer("/stats/total").and_then(Value::as_object) else {
            debug!(flower = %target, worker = %worker, "Worker reports no task totals");
            continue;
        };

        let mut sum = 0.0;
        for (name, count) in totals {
            let Some(count) = count.as_f64() else {
                debug!(worker = %worker, task = %name, "Skipping non-numeric task total");
                continue;
            };
            sum += count;
            samples.push(Sample::new(
                target_key(WORKER_TASKS, target)
                    .with_label("worker", worker.as_str())
                    .with_label("name", name.as_str()),
                count,
            ));
        }

        samples.push(Sample::new(
            target_key(WORKER_TASKS_TOTAL, target).with_label("worker", worker.as_str()),
            sum,
        ));
    }

    samples
}
