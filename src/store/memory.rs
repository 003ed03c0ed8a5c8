//! In-process adapters. Used by tests and for running without a database.

use std::{
    collections::HashMap,
    sync::{
        Mutex, PoisonError, RwLock,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use uuid::Uuid;

use super::{ExamStore, ResultSink};
use crate::{
    exam::error::ExamError,
    models::{
        exam::Exam,
        exam_result::{ExamResult, NewExamResult},
    },
};

#[derive(Debug)]
pub struct MemoryExamStore {
    exams: RwLock<HashMap<i64, Exam>>,
    next_id: AtomicI64,
}

impl Default for MemoryExamStore {
    fn default() -> Self {
        Self {
            exams: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with definitions that keep their own IDs.
    pub fn with_exams(exams: impl IntoIterator<Item = Exam>) -> Self {
        let map: HashMap<i64, Exam> = exams.into_iter().map(|e| (e.id, e)).collect();
        let next = map.keys().max().copied().unwrap_or(0) + 1;
        Self {
            exams: RwLock::new(map),
            next_id: AtomicI64::new(next),
        }
    }
}

#[async_trait]
impl ExamStore for MemoryExamStore {
    async fn fetch_exam(&self, id: i64) -> Result<Option<Exam>, ExamError> {
        let exams = self.exams.read().unwrap_or_else(PoisonError::into_inner);
        Ok(exams.get(&id).cloned())
    }

    async fn insert_exam(&self, exam: Exam) -> Result<Exam, ExamError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let exam = Exam { id, ..exam };
        self.exams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, exam.clone());
        Ok(exam)
    }
}

#[derive(Debug, Default)]
pub struct MemoryResultSink {
    rows: Mutex<Vec<ExamResult>>,
}

impl MemoryResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultSink for MemoryResultSink {
    async fn insert_once(
        &self,
        attempt_token: Uuid,
        result: &NewExamResult,
    ) -> Result<ExamResult, ExamError> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = rows.iter().find(|r| r.attempt_token == attempt_token) {
            return Ok(existing.clone());
        }

        let stored = result.clone().into_result(rows.len() as i64 + 1, attempt_token);
        rows.push(stored.clone());
        Ok(stored)
    }

    async fn find_by_token(&self, attempt_token: Uuid) -> Result<Option<ExamResult>, ExamError> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().find(|r| r.attempt_token == attempt_token).cloned())
    }

    async fn results_for_student(
        &self,
        student_id: i64,
        exam_id: Option<i64>,
    ) -> Result<Vec<ExamResult>, ExamError> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.student_id == student_id)
            .filter(|r| exam_id.is_none_or(|id| r.exam_id == id))
            .cloned()
            .collect())
    }

    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<ExamResult>, ExamError> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows
            .iter()
            .rev()
            .filter(|r| r.exam_id == exam_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::{
        exam::fixtures::{exam, mc},
        exam_result::AnswerSheet,
    };

    fn graded(student_id: i64, exam_id: i64, score: i32) -> NewExamResult {
        NewExamResult {
            student_id,
            exam_id,
            score,
            total_score: 2,
            percentage: f64::from(score) * 50.0,
            is_passed: score == 2,
            answers: AnswerSheet::new(),
            completed_at: Utc::now(),
            time_spent: 12,
        }
    }

    #[tokio::test]
    async fn test_record_is_idempotent_per_token() {
        let sink = MemoryResultSink::new();
        let token = Uuid::new_v4();

        let first = sink.record(token, &graded(1, 1, 2)).await.unwrap();
        let second = sink.record(token, &graded(1, 1, 0)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.find_by_token(token).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_record_rejects_inconsistent_percentage() {
        let sink = MemoryResultSink::new();
        let mut tampered = graded(1, 1, 1);
        tampered.percentage = 100.0;

        let err = sink.record(Uuid::new_v4(), &tampered).await.unwrap_err();
        assert!(matches!(err, ExamError::Validation(_)));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_queries_and_statistics() {
        let sink = MemoryResultSink::new();
        sink.record(Uuid::new_v4(), &graded(1, 10, 2)).await.unwrap();
        sink.record(Uuid::new_v4(), &graded(1, 11, 1)).await.unwrap();
        sink.record(Uuid::new_v4(), &graded(2, 10, 1)).await.unwrap();

        assert_eq!(sink.results_for_student(1, None).await.unwrap().len(), 2);
        let only_10 = sink.results_for_student(1, Some(10)).await.unwrap();
        assert_eq!(only_10.len(), 1);
        assert_eq!(only_10[0].exam_id, 10);

        let stats = sink.statistics(10).await.unwrap();
        assert_eq!(stats.attempts, 2);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.average_percentage, 75.0);
        assert_eq!(stats.pass_rate, 50.0);
    }

    #[tokio::test]
    async fn test_exam_store_assigns_fresh_ids() {
        let store = MemoryExamStore::with_exams([exam(vec![mc("Q1", "A", 1)], None)]);
        let inserted = store
            .insert_exam(exam(vec![mc("Q1", "B", 1)], None))
            .await
            .unwrap();

        assert_eq!(inserted.id, 2);
        assert!(store.fetch_exam(1).await.unwrap().is_some());
        assert!(store.fetch_exam(2).await.unwrap().is_some());
        assert!(store.fetch_exam(3).await.unwrap().is_none());
    }
}
