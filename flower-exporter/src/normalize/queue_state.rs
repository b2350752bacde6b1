//! `/api/workers`: task counts per queue and state.
//!
//! Workers report their tasks by state but not by queue. The queue is
//! recovered from each task's routing key, looked up in the routing keys
//! of the queues the workers consume from.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use tracing::debug;

use super::target_key;
use crate::registry::Sample;

pub const QUEUE_TASKS: &str = "celery_queue_tasks";

pub const METRICS: &[(&str, &str)] = &[(QUEUE_TASKS, "Number of tasks per queue and state")];

/// Task lists read from each worker, by state.
pub const STATES: [&str; 4] = ["scheduled", "active", "reserved", "revoked"];

pub fn normalize(target: &str, payload: &Value) -> Vec<Sample> {
    let Some(workers) = payload.as_object() else {
        debug!(flower = %target, "Workers payload is not an object");
        return Vec::new();
    };

    let routes = routing_table(workers);

    // Every known queue reports every state, zero included.
    let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for queue in routes.values() {
        for state in STATES {
            counts.insert((*queue, state), 0);
        }
    }

    for (worker, info) in workers {
        for state in STATES {
            let Some(tasks) = info.get(state).and_then(Value::as_array) else {
                continue;
            };

            let mut dropped = 0usize;
            for task in tasks {
                match routing_key(task).and_then(|key| routes.get(key)) {
                    Some(queue) => *counts.entry((*queue, state)).or_insert(0) += 1,
                    None => dropped += 1,
                }
            }

            if dropped > 0 {
                debug!(
                    flower = %target,
                    worker = %worker,
                    state,
                    dropped,
                    "Tasks without a resolvable routing key excluded"
                );
            }
        }
    }

    counts
        .into_iter()
        .map(|((queue, state), count)| {
            Sample::new(
                target_key(QUEUE_TASKS, target)
                    .with_label("queue", queue)
                    .with_label("state", state.to_uppercase()),
                count as f64,
            )
        })
        .collect()
}

/// Routing key to queue name, across all workers' active queues.
fn routing_table(workers: &Map<String, Value>) -> HashMap<&str, &str> {
    let mut routes = HashMap::new();

    for (worker, info) in workers {
        let Some(queues) = info.get("active_queues").and_then(Value::as_array) else {
            debug!(worker = %worker, "Worker reports no active queues");
            continue;
        };

        for queue in queues {
            let name = queue.get("name").and_then(Value::as_str);
            let key = queue.get("routing_key").and_then(Value::as_str);
            if let (Some(name), Some(key)) = (name, key) {
                routes.insert(key, name);
            }
        }
    }

    routes
}

/// Routing key of a task entry.
///
/// Active and reserved tasks carry `delivery_info` at the top level;
/// scheduled entries wrap the task in `request`. Revoked entries are bare
/// task ids and never resolve.
fn routing_key(task: &Value) -> Option<&str> {
    task.pointer("/delivery_info/routing_key")
        .or_else(|| task.pointer("/request/delivery_info/routing_key"))
        .and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn count(samples: &[Sample], queue: &str, state: &str) -> Option<f64> {
        samples
            .iter()
            .find(|s| s.key.label("queue") == Some(queue) && s.key.label("state") == Some(state))
            .map(|s| s.value)
    }

    #[test]
    fn test_unknown_routing_key_dropped() {
        let payload = json!({
            "w1": {
                "active_queues": [{ "name": "q1", "routing_key": "rk1" }],
                "active": [
                    { "delivery_info": { "routing_key": "rk1" } },
                    { "delivery_info": { "routing_key": "rk2" } }
                ]
            }
        });

        let samples = normalize("http://f", &payload);

        assert_eq!(count(&samples, "q1", "ACTIVE"), Some(1.0));
        assert_eq!(count(&samples, "q1", "SCHEDULED"), Some(0.0));
        assert_eq!(count(&samples, "q1", "RESERVED"), Some(0.0));
        assert_eq!(count(&samples, "q1", "REVOKED"), Some(0.0));
        // Only q1 exists; the rk2 task contributes nowhere.
        assert_eq!(samples.len(), 4);
        assert_eq!(samples.iter().map(|s| s.value).sum::<f64>(), 1.0);
    }

    #[test]
    fn test_states_and_scheduled_shape() {
        let payload = json!({
            "w1": {
                "active_queues": [
                    { "name": "default", "routing_key": "celery" },
                    { "name": "mail", "routing_key": "mail.send" }
                ],
                "active": [{ "delivery_info": { "routing_key": "celery" } }],
                "reserved": [
                    { "delivery_info": { "routing_key": "mail.send" } },
                    { "delivery_info": { "routing_key": "mail.send" } }
                ],
                "scheduled": [
                    { "eta": "2024-01-01T00:00:00", "request": { "delivery_info": { "routing_key": "celery" } } }
                ],
                "revoked": ["0f9b8c1e-task-id"]
            }
        });

        let samples = normalize("http://f", &payload);

        assert_eq!(count(&samples, "default", "ACTIVE"), Some(1.0));
        assert_eq!(count(&samples, "default", "SCHEDULED"), Some(1.0));
        assert_eq!(count(&samples, "mail", "RESERVED"), Some(2.0));
        assert_eq!(count(&samples, "mail", "REVOKED"), Some(0.0));
        assert_eq!(samples.len(), 8);
    }

    #[test]
    fn test_lookup_spans_workers() {
        let payload = json!({
            "w1": { "active_queues": [{ "name": "q1", "routing_key": "rk1" }] },
            "w2": { "active": [{ "delivery_info": { "routing_key": "rk1" } }] }
        });

        let samples = normalize("http://f", &payload);
        assert_eq!(count(&samples, "q1", "ACTIVE"), Some(1.0));
    }

    #[test]
    fn test_worker_without_queues() {
        let payload = json!({
            "w1": { "active": [{ "delivery_info": { "routing_key": "rk1" } }] },
            "w2": null
        });

        assert!(normalize("http://f", &payload).is_empty());
    }

    #[test]
    fn test_not_an_object() {
        assert!(normalize("http://f", &json!([])).is_empty());
    }
}
