// src/models/attempt.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    exam::{grading::QuestionOutcome, session::SessionStatus},
    models::{
        exam::{AnswerValue, PublicExam},
        exam_result::{AnswerSheet, ExamResult},
    },
};

/// DTO for recording (or overwriting) one answer.
#[derive(Debug, Deserialize, Validate)]
pub struct RecordAnswerRequest {
    pub question_index: usize,
    #[validate(custom(function = validate_answer_value))]
    pub value: AnswerValue,
}

fn validate_answer_value(value: &AnswerValue) -> Result<(), validator::ValidationError> {
    if let AnswerValue::Text(text) = value {
        if text.len() > 2000 {
            return Err(validator::ValidationError::new("answer_too_long"));
        }
    }
    Ok(())
}

/// DTO for moving the question cursor.
#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub question_index: usize,
}

/// Returned when an attempt starts.
#[derive(Debug, Serialize)]
pub struct StartedAttempt {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub exam: PublicExam,
}

/// Acknowledgment of a recorded answer.
#[derive(Debug, Serialize)]
pub struct AnswerReceipt {
    /// `false` when the answer arrived too late and was dropped.
    pub accepted: bool,
    pub status: SessionStatus,
    pub remaining_seconds: i64,
}

/// Snapshot of a live attempt, as seen by the student.
#[derive(Debug, Serialize)]
pub struct AttemptView {
    pub session_id: Uuid,
    pub exam_id: i64,
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub remaining_seconds: i64,
    pub current_question_index: usize,
    pub answers: AnswerSheet,
    pub result: Option<ExamResult>,
}

/// Outcome of a submit call.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub result: ExamResult,

    /// The attempt had already been submitted; `result` is the original record.
    pub duplicate: bool,

    /// Per-question review. Absent when the live session was already discarded.
    pub review: Option<Vec<QuestionOutcome>>,
}
