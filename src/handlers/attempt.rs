// src/handlers/attempt.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppError,
    exam::{SessionManager, SubmitTrigger},
    models::attempt::{NavigateRequest, RecordAnswerRequest},
    utils::jwt::Claims,
};

/// Records (or overwrites) one answer of a running attempt.
/// Answers arriving after the deadline are acknowledged with `accepted: false`.
pub async fn record_answer(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let receipt = sessions
        .record_answer(
            session_id,
            claims.student_id()?,
            payload.question_index,
            payload.value,
        )
        .await?;

    Ok(Json(receipt))
}

/// Moves the question cursor. Purely navigational.
pub async fn navigate(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = sessions
        .navigate(session_id, claims.student_id()?, payload.question_index)
        .await?;

    Ok(Json(view))
}

/// Current state of an attempt, including remaining time.
pub async fn get_attempt(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let view = sessions.observe(session_id, claims.student_id()?).await?;
    Ok(Json(view))
}

/// Submits the attempt and returns the graded result.
///
/// * Grading is always recomputed from the stored exam definition.
/// * A repeated submit returns the original result with `duplicate: true`.
pub async fn submit_attempt(
    State(sessions): State<SessionManager>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = sessions
        .submit(session_id, claims.student_id()?, SubmitTrigger::Manual)
        .await?;

    Ok(Json(outcome))
}
