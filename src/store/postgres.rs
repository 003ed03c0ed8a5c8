//! Postgres adapters backed by the `exams` and `exam_results` tables.

use async_trait::async_trait;
use sqlx::{PgPool, Row, types::Json};
use uuid::Uuid;

use super::{ExamStore, ResultSink};
use crate::{
    exam::error::ExamError,
    models::{
        exam::Exam,
        exam_result::{ExamResult, ExamStatistics, NewExamResult},
    },
};

const RESULT_COLUMNS: &str = "id, attempt_token, student_id, exam_id, score, total_score, \
     percentage, is_passed, answers, completed_at, time_spent";

#[derive(Debug, Clone)]
pub struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn fetch_exam(&self, id: i64) -> Result<Option<Exam>, ExamError> {
        let exam = sqlx::query_as::<_, Exam>(
            r#"
            SELECT
                id, title, course_id, questions, duration_seconds,
                total_score, passing_score, is_active, created_at
            FROM exams
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to fetch exam {}: {:?}", id, e);
            ExamError::from(e)
        })?;

        Ok(exam)
    }

    async fn insert_exam(&self, exam: Exam) -> Result<Exam, ExamError> {
        let row = sqlx::query(
            r#"
            INSERT INTO exams
            (title, course_id, questions, duration_seconds, total_score, passing_score, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at
            "#,
        )
        .bind(&exam.title)
        .bind(exam.course_id)
        .bind(Json(&exam.questions.0))
        .bind(exam.duration_seconds)
        .bind(exam.total_score)
        .bind(exam.passing_score)
        .bind(exam.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exam: {:?}", e);
            ExamError::from(e)
        })?;

        Ok(Exam {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
            ..exam
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgResultSink {
    pool: PgPool,
}

impl PgResultSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultSink for PgResultSink {
    async fn insert_once(
        &self,
        attempt_token: Uuid,
        result: &NewExamResult,
    ) -> Result<ExamResult, ExamError> {
        // A retried attempt hits the unique token and inserts nothing.
        let inserted = sqlx::query_as::<_, ExamResult>(&format!(
            r#"
            INSERT INTO exam_results
            (attempt_token, student_id, exam_id, score, total_score,
             percentage, is_passed, answers, completed_at, time_spent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (attempt_token) DO NOTHING
            RETURNING {RESULT_COLUMNS}
            "#
        ))
        .bind(attempt_token)
        .bind(result.student_id)
        .bind(result.exam_id)
        .bind(result.score)
        .bind(result.total_score)
        .bind(result.percentage)
        .bind(result.is_passed)
        .bind(Json(&result.answers))
        .bind(result.completed_at)
        .bind(result.time_spent)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to insert exam result: {:?}", e);
            ExamError::from(e)
        })?;

        match inserted {
            Some(stored) => Ok(stored),
            None => self.find_by_token(attempt_token).await?.ok_or_else(|| {
                ExamError::Storage(format!("result for attempt {attempt_token} vanished"))
            }),
        }
    }

    async fn find_by_token(&self, attempt_token: Uuid) -> Result<Option<ExamResult>, ExamError> {
        let result = sqlx::query_as::<_, ExamResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM exam_results WHERE attempt_token = $1"
        ))
        .bind(attempt_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(result)
    }

    async fn results_for_student(
        &self,
        student_id: i64,
        exam_id: Option<i64>,
    ) -> Result<Vec<ExamResult>, ExamError> {
        let results = sqlx::query_as::<_, ExamResult>(&format!(
            r#"
            SELECT {RESULT_COLUMNS}
            FROM exam_results
            WHERE student_id = $1
              AND ($2::BIGINT IS NULL OR exam_id = $2)
            ORDER BY completed_at DESC, id DESC
            "#
        ))
        .bind(student_id)
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list results of student {}: {:?}", student_id, e);
            ExamError::from(e)
        })?;

        Ok(results)
    }

    async fn results_for_exam(&self, exam_id: i64) -> Result<Vec<ExamResult>, ExamError> {
        let results = sqlx::query_as::<_, ExamResult>(&format!(
            r#"
            SELECT {RESULT_COLUMNS}
            FROM exam_results
            WHERE exam_id = $1
            ORDER BY completed_at DESC, id DESC
            "#
        ))
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list results of exam {}: {:?}", exam_id, e);
            ExamError::from(e)
        })?;

        Ok(results)
    }

    async fn statistics(&self, exam_id: i64) -> Result<ExamStatistics, ExamError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS attempts,
                COUNT(*) FILTER (WHERE is_passed) AS passed,
                COALESCE(AVG(percentage), 0) AS average_percentage,
                MAX(score) AS highest_score
            FROM exam_results
            WHERE exam_id = $1
            "#,
        )
        .bind(exam_id)
        .fetch_one(&self.pool)
        .await?;

        let attempts: i64 = row.try_get("attempts")?;
        let passed: i64 = row.try_get("passed")?;

        Ok(ExamStatistics::from_counts(
            exam_id,
            usize::try_from(attempts).unwrap_or_default(),
            usize::try_from(passed).unwrap_or_default(),
            row.try_get("average_percentage")?,
            row.try_get("highest_score")?,
        ))
    }
}
