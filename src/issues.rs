//! `IssueCollector`: the single thread-safe, append-only log that per-item
//! stage failures accumulate into, flushed to `worker-issues.json` at job
//! completion (spec §9 design note).

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub stage: String,
    pub path: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Default)]
pub struct IssueCollector {
    issues: Mutex<Vec<Issue>>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stage: impl Into<String>, path: impl Into<String>, message: impl Into<String>, severity: Severity) {
        let issue = Issue {
            stage: stage.into(),
            path: path.into(),
            message: message.into(),
            severity,
        };
        self.issues.lock().unwrap().push(issue);
    }

    pub fn warn(&self, stage: impl Into<String>, path: impl Into<String>, message: impl Into<String>) {
        self.record(stage, path, message, Severity::Warning);
    }

    pub fn error(&self, stage: impl Into<String>, path: impl Into<String>, message: impl Into<String>) {
        self.record(stage, path, message, Severity::Error);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.lock().unwrap().len()
    }

    /// Snapshot the collected issues without clearing them.
    pub fn snapshot(&self) -> Vec<Issue> {
        self.issues.lock().unwrap().clone()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.issues.lock().unwrap().iter().any(|i| i.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_in_order() {
        let collector = IssueCollector::new();
        collector.warn("media", "a.jpg", "skip");
        collector.error("markdown", "b.md", "parse failed");
        let snap = collector.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].severity, Severity::Warning);
        assert_eq!(snap[1].severity, Severity::Error);
    }

    #[test]
    fn contains_path_checks_recorded_items() {
        let collector = IssueCollector::new();
        collector.warn("media", "a.jpg", "skip");
        assert!(collector.contains_path("a.jpg"));
        assert!(!collector.contains_path("missing.jpg"));
    }
}
