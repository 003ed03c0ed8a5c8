// src/handlers/exam.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    exam::{ExamError, SessionManager},
    models::exam::PublicExam,
    store::ResultSink,
    utils::jwt::Claims,
};

/// Returns an exam definition without answer keys or explanations.
pub async fn get_exam(
    State(sessions): State<SessionManager>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = sessions.fetch_exam(exam_id).await?;

    if !exam.is_active {
        return Err(ExamError::InactiveExam(exam_id).into());
    }

    Ok(Json(PublicExam::from(&exam)))
}

/// Starts a timed attempt for the authenticated student.
///
/// * Fails with 404 for unknown exams and 409 for inactive ones.
/// * Returns the session handle, deadline and questions.
pub async fn start_attempt(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let started = sessions.start_attempt(exam_id, student_id).await?;

    Ok((StatusCode::CREATED, Json(started)))
}

/// Aggregated results of an exam: attempts, average, best score, pass rate.
pub async fn get_statistics(
    State(results): State<Arc<dyn ResultSink>>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let stats = results.statistics(exam_id).await?;
    Ok(Json(stats))
}
