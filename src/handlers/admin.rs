// src/handlers/admin.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::exam::CreateExamRequest,
    store::{ExamStore, ResultSink},
};

/// Creates a new exam definition.
/// Admin only.
///
/// Text is sanitized and `total_score` is computed from the questions;
/// definitions that break the exam invariants are rejected with 400.
pub async fn create_exam(
    State(exams): State<Arc<dyn ExamStore>>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exam = payload.into_exam(0);
    if let Err(e) = exam.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let exam = exams.insert_exam(exam).await?;
    tracing::info!(exam_id = exam.id, total_score = exam.total_score, "Exam created");

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": exam.id, "total_score": exam.total_score})),
    ))
}

/// Lists every recorded result of an exam, newest first.
/// Admin only.
pub async fn list_exam_results(
    State(results): State<Arc<dyn ResultSink>>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let list = results.results_for_exam(exam_id).await?;
    Ok(Json(list))
}
