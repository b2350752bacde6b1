//! Metric registry that stores the current value of every exposed series.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

/// Label carrying the target identity on every series.
pub const TARGET_LABEL: &str = "flower";

/// A unique identifier for a metric time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    /// The full Prometheus metric name.
    pub name: String,
    /// Label key-value pairs, sorted by key.
    pub labels: Vec<(String, String)>,
}

impl SeriesKey {
    /// Create a key without labels.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
        }
    }

    /// Add a label, replacing any previous value for the same key.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.labels.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => {
                self.labels.push((key, value));
                // Sort for consistent hashing
                self.labels.sort_by(|a, b| a.0.cmp(&b.0));
            }
        }
        self
    }

    /// Value of a label, if present.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Format labels for Prometheus exposition format.
    pub fn format_labels(&self) -> String {
        if self.labels.is_empty() {
            return String::new();
        }

        let parts: Vec<String> = self
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
            .collect();

        format!("{{{}}}", parts.join(","))
    }
}

/// One normalized observation: a series and its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub key: SeriesKey,
    pub value: f64,
}

impl Sample {
    pub fn new(key: SeriesKey, value: f64) -> Self {
        Self { key, value }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    /// Batches applied through [`MetricRegistry::apply`].
    pub updates_applied: u64,
    /// Individual values written.
    pub samples_written: u64,
}

/// Thread-safe store of gauge series.
///
/// Series are never removed: a series missing from a newer batch is set to
/// zero instead.
#[derive(Default)]
pub struct MetricRegistry {
    series: RwLock<HashMap<SeriesKey, f64>>,
    help: RwLock<HashMap<String, String>>,
    stats: RwLock<RegistryStats>,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<MetricRegistry>;

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach HELP text to a metric name.
    pub fn describe(&self, name: impl Into<String>, help: impl Into<String>) {
        self.help.write().insert(name.into(), help.into());
    }

    /// Set the value of a series, creating it if needed.
    pub fn set(&self, key: SeriesKey, value: f64) {
        self.series.write().insert(key, value);
        self.stats.write().samples_written += 1;
    }

    /// Current value of a series.
    pub fn get(&self, key: &SeriesKey) -> Option<f64> {
        self.series.read().get(key).copied()
    }

    /// Set every known series whose `label` equals `value` to zero.
    ///
    /// Returns the number of matching series.
    pub fn zero_all_known(&self, label: &str, value: &str) -> usize {
        let mut series = self.series.write();
        zero_matching(&mut series, label, value)
    }

    /// Replace the state of every series matching `label = value` with `samples`.
    ///
    /// Matching series absent from `samples` read zero afterwards. Zeroing and
    /// writing happen under one lock, so readers never see the zeroed
    /// intermediate state.
    pub fn apply(&self, label: &str, value: &str, samples: Vec<Sample>) -> usize {
        let written = samples.len();
        {
            let mut series = self.series.write();
            let zeroed = zero_matching(&mut series, label, value);
            for sample in samples {
                series.insert(sample.key, sample.value);
            }
            trace!(label, value, zeroed, written, "Applied batch");
        }

        let mut stats = self.stats.write();
        stats.updates_applied += 1;
        stats.samples_written += written as u64;
        written
    }

    /// All series and their values, sorted by key.
    pub fn enumerate(&self) -> Vec<(SeriesKey, f64)> {
        let mut all: Vec<(SeriesKey, f64)> = self
            .series
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Get the current number of stored series.
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Get registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.stats.read().clone()
    }

    /// Render metrics in Prometheus exposition format.
    pub fn render(&self) -> String {
        let series = self.series.read();
        let help = self.help.read();
        let mut output = Vec::with_capacity(series.len() * 100);

        // Group by name, sorted for consistent output
        let mut by_name: BTreeMap<&str, Vec<(&SeriesKey, f64)>> = BTreeMap::new();
        for (key, value) in series.iter() {
            by_name.entry(&key.name).or_default().push((key, *value));
        }

        for (name, mut entries) in by_name {
            entries.sort_by(|a, b| a.0.labels.cmp(&b.0.labels));

            if let Some(text) = help.get(name) {
                writeln!(output, "# HELP {} {}", name, escape_help(text)).ok();
            }
            writeln!(output, "# TYPE {} gauge", name).ok();

            for (key, value) in entries {
                writeln!(
                    output,
                    "{}{} {}",
                    key.name,
                    key.format_labels(),
                    format_value(value)
                )
                .ok();
            }
        }

        // Add registry stats as metrics
        let stats = self.stats.read();
        writeln!(output).ok();
        writeln!(output, "# TYPE flower_exporter_series_total gauge").ok();
        writeln!(output, "flower_exporter_series_total {}", series.len()).ok();
        writeln!(output, "# TYPE flower_exporter_updates_applied_total counter").ok();
        writeln!(
            output,
            "flower_exporter_updates_applied_total {}",
            stats.updates_applied
        )
        .ok();

        String::from_utf8(output).unwrap_or_default()
    }
}

fn zero_matching(series: &mut HashMap<SeriesKey, f64>, label: &str, value: &str) -> usize {
    let mut matched = 0;
    for (key, v) in series.iter_mut() {
        if key.label(label) == Some(value) {
            *v = 0.0;
            matched += 1;
        }
    }
    matched
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}
