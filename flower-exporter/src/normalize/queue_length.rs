//! `/api/queues/length`: broker message count per active queue.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::target_key;
use crate::registry::Sample;

pub const TASKS_BY_QUEUE: &str = "celery_tasks_by_queue";

pub const METRICS: &[(&str, &str)] = &[(TASKS_BY_QUEUE, "Number of tasks per queue")];

#[derive(Debug, Deserialize)]
struct QueueLength {
    name: String,
    messages: f64,
}

pub fn normalize(target: &str, payload: &Value) -> Vec<Sample> {
    let Some(queues) = payload.get("active_queues").and_then(Value::as_array) else {
        debug!(flower = %target, "Payload has no active_queues list");
        return Vec::new();
    };

    queues
        .iter()
        .filter_map(|entry| match QueueLength::deserialize(entry) {
            Ok(queue) => Some(queue),
            Err(e) => {
                debug!(flower = %target, error = %e, "Skipping malformed queue entry");
                None
            }
        })
        .map(|queue| {
            Sample::new(
                target_key(TASKS_BY_QUEUE, target).with_label("queue", queue.name),
                queue.messages,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_queue_lengths() {
        let payload = json!({
            "active_queues": [
                { "name": "q1", "messages": 7 },
                { "name": "celery", "messages": 0 }
            ]
        });

        let samples = normalize("http://flower:5555", &payload);

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].key.name, TASKS_BY_QUEUE);
        assert_eq!(samples[0].key.label("flower"), Some("http://flower:5555"));
        assert_eq!(samples[0].key.label("queue"), Some("q1"));
        assert_eq!(samples[0].value, 7.0);
        assert_eq!(samples[1].key.label("queue"), Some("celery"));
        assert_eq!(samples[1].value, 0.0);
    }

    #[test]
    fn test_empty_queue_list() {
        let payload = json!({ "active_queues": [] });
        assert!(normalize("http://f", &payload).is_empty());
    }

    #[test]
    fn test_missing_queue_list() {
        assert!(normalize("http://f", &json!({})).is_empty());
        assert!(normalize("http://f", &json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn test_malformed_entries_do_not_poison_batch() {
        let payload = json!({
            "active_queues": [
                { "name": "no-count" },
                { "messages": 4 },
                { "name": "text", "messages": "lots" },
                "garbage",
                { "name": "good", "messages": 2 }
            ]
        });

        let samples = normalize("http://f", &payload);

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].key.label("queue"), Some("good"));
        assert_eq!(samples[0].value, 2.0);
    }
}
