//! Storage contracts for exam definitions and graded results.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    exam::error::ExamError,
    models::{
        exam::Exam,
        exam_result::{ExamResult, ExamStatistics, NewExamResult},
    },
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryExamStore, MemoryResultSink};
pub use postgres::{PgExamStore, PgResultSink};

/// Read side of the exam catalog, plus the single write used by admins.
#[async_trait]
pub trait ExamStore: Send + Sync {
    /// Fetch an exam by ID. `Ok(None)` if it does not exist.
    async fn fetch_exam(&self, id: i64) -> Result<Option<Exam>, ExamError>;

    /// Store a new definition. The given `id` is ignored and a fresh one assigned.
    async fn insert_exam(&self, exam: Exam) -> Result<Exam, ExamError>;
}

/// Write-once store of graded attempts.
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Insert unless a result with `attempt_token` already exists; either way
    /// return the stored record for that token.
    async fn insert_once(
        &self,
        attempt_token: Uuid,
        result: &NewExamResult,
    ) -> Result<ExamResult, ExamError>;

    async fn find_by_token(&self, attempt_token: Uuid) -> Result<Option<ExamResult>, ExamError>;

    /// A student's results, newest first, optionally for one exam only.
    async fn results_for_student(
        &self,
        student_id: i64,
        exam_id: Option<i64>,
    ) -> Result<Vec<ExamResult>, ExamError>;

    /// All results of an exam, newest first.
    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<ExamResult>, ExamError>;

    /// Records a graded attempt.
    ///
    /// # Errors
    ///
    /// `ExamError::Validation` if score, total and percentage disagree.
    async fn record(
        &self,
        attempt_token: Uuid,
        result: &NewExamResult,
    ) -> Result<ExamResult, ExamError> {
        result.verify()?;
        self.insert_once(attempt_token, result).await
    }

    async fn statistics(&self, exam_id: i64) -> Result<ExamStatistics, ExamError> {
        let results = self.results_for_exam(exam_id).await?;
        Ok(ExamStatistics::from_results(exam_id, &results))
    }
}
