// src/handlers/result.rs

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crate::{
    error::AppError, models::exam_result::ResultListParams, store::ResultSink, utils::jwt::Claims,
};

/// Lists the current student's results, newest first.
/// Optional `?exam_id=` narrows the list to one exam.
pub async fn list_my_results(
    State(results): State<Arc<dyn ResultSink>>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<ResultListParams>,
) -> Result<impl IntoResponse, AppError> {
    let student_id = claims.student_id()?;
    let list = results
        .results_for_student(student_id, params.exam_id)
        .await?;

    Ok(Json(list))
}
