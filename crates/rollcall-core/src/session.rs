//! Per-run deduplication of attendance attempts.

use crate::types::UNKNOWN_LABEL;
use std::collections::HashSet;

/// Labels already recorded during the current camera run.
///
/// Advisory only: it saves storage round-trips while a student stays in
/// frame. Storage uniqueness remains the authority across restarts.
#[derive(Debug, Default)]
pub struct SessionMarks {
    marked: HashSet<String>,
}

impl SessionMarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a match on `label` should reach the recorder.
    /// "Unknown" never does.
    pub fn should_attempt(&self, label: &str) -> bool {
        label != UNKNOWN_LABEL && !self.marked.contains(label)
    }

    pub fn mark_attempted(&mut self, label: &str) {
        if label != UNKNOWN_LABEL {
            self.marked.insert(label.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_allowed_then_skipped() {
        let mut marks = SessionMarks::new();
        assert!(marks.should_attempt("ada"));
        marks.mark_attempted("ada");
        assert!(!marks.should_attempt("ada"));
        assert!(marks.should_attempt("grace"));
        assert_eq!(marks.len(), 1);
    }

    #[test]
    fn test_unknown_never_attempted_or_marked() {
        let mut marks = SessionMarks::new();
        assert!(!marks.should_attempt(UNKNOWN_LABEL));
        marks.mark_attempted(UNKNOWN_LABEL);
        assert!(marks.is_empty());
    }
}
