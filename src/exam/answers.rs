//! Sparse, index-keyed store of the answers given during one attempt.

use std::sync::Arc;

use crate::models::{exam::AnswerValue, exam_result::AnswerSheet};

/// In-progress answers. Values are kept verbatim; nothing is interpreted here.
#[derive(Debug, Default)]
pub struct AnswerCollector {
    answers: AnswerSheet,
}

impl AnswerCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` for `index`, replacing any earlier answer.
    pub fn set(&mut self, index: usize, value: AnswerValue) {
        self.answers.insert(index, value);
    }

    /// `None` means unanswered.
    pub fn get(&self, index: usize) -> Option<&AnswerValue> {
        self.answers.get(&index)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    /// Immutable copy for grading and persistence. Later writes to the
    /// collector do not show through.
    pub fn snapshot(&self) -> Arc<AnswerSheet> {
        Arc::new(self.answers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites_and_get_reports_unanswered() {
        let mut collector = AnswerCollector::new();
        collector.set(2, AnswerValue::Text("B".into()));
        collector.set(2, AnswerValue::Text("C".into()));

        assert_eq!(collector.get(2), Some(&AnswerValue::Text("C".into())));
        assert_eq!(collector.get(0), None);
        assert_eq!(collector.answered_count(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut collector = AnswerCollector::new();
        collector.set(0, AnswerValue::Flag(true));
        let frozen = collector.snapshot();

        collector.set(0, AnswerValue::Flag(false));
        collector.set(1, AnswerValue::Text("late".into()));

        assert_eq!(frozen.len(), 1);
        assert_eq!(frozen.get(&0), Some(&AnswerValue::Flag(true)));
    }
}
