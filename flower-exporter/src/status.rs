//! Shared per-target poller status.

use std::collections::BTreeMap;
use std::sync::Arc;

use flower_exporter_common::{TargetState, TargetStatus};
use parking_lot::RwLock;

/// Status of every target, keyed by target URL.
#[derive(Debug, Default)]
pub struct StatusBoard {
    targets: RwLock<BTreeMap<String, TargetStatus>>,
}

/// Create a shareable status handle.
pub type SharedStatusBoard = Arc<StatusBoard>;

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target in the `Starting` state.
    pub fn register(&self, target: &str) {
        self.targets
            .write()
            .insert(target.to_string(), TargetStatus::new(target));
    }

    /// Apply `f` to the status of `target`, registering it first if needed.
    pub fn update(&self, target: &str, f: impl FnOnce(&mut TargetStatus)) {
        let mut targets = self.targets.write();
        let status = targets
            .entry(target.to_string())
            .or_insert_with(|| TargetStatus::new(target));
        f(status);
    }

    pub fn get(&self, target: &str) -> Option<TargetStatus> {
        self.targets.read().get(target).cloned()
    }

    pub fn state(&self, target: &str) -> Option<TargetState> {
        self.targets.read().get(target).map(|s| s.state)
    }

    /// All statuses, ordered by target.
    pub fn snapshot(&self) -> Vec<TargetStatus> {
        self.targets.read().values().cloned().collect()
    }

    /// At least one running target has completed a successful poll.
    pub fn is_ready(&self) -> bool {
        self.targets.read().values().any(TargetStatus::is_serving)
    }

    /// Every registered target has stopped.
    pub fn all_stopped(&self) -> bool {
        self.targets.read().values().all(|s| !s.state.is_active())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_update() {
        let board = StatusBoard::new();
        board.register("http://a");

        assert_eq!(board.state("http://a"), Some(TargetState::Starting));
        assert!(!board.is_ready());

        board.update("http://a", |s| s.record_success(10));
        assert_eq!(board.state("http://a"), Some(TargetState::Polling));
        assert!(board.is_ready());
    }

    #[test]
    fn test_ready_requires_running_target() {
        let board = StatusBoard::new();
        board.register("http://a");
        board.register("http://b");

        board.update("http://a", |s| s.record_success(10));
        board.update("http://a", |s| s.record_failure("refused", true));
        assert!(!board.is_ready());
        assert!(!board.all_stopped());

        board.update("http://b", |s| s.mark_stopped());
        assert!(board.all_stopped());
    }

    #[test]
    fn test_snapshot_ordered() {
        let board = StatusBoard::new();
        board.register("http://b");
        board.register("http://a");

        let targets: Vec<String> = board.snapshot().into_iter().map(|s| s.target).collect();
        assert_eq!(targets, vec!["http://a", "http://b"]);
    }
}
