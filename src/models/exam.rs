// src/models/exam.rs

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

use crate::{exam::error::ExamError, utils::html::clean_html};

/// Kind of question. Decides how an answer is compared to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
}

/// The answer key of a question.
///
/// Short-answer questions may list several acceptable literals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(String),
    AnyOf(Vec<String>),
}

impl CorrectAnswer {
    /// Exact, case-sensitive match after trimming surrounding whitespace.
    pub fn accepts(&self, given: &str) -> bool {
        let given = given.trim();
        match self {
            CorrectAnswer::Single(expected) => expected.trim() == given,
            CorrectAnswer::AnyOf(accepted) => accepted.iter().any(|a| a.trim() == given),
        }
    }

    fn as_single(&self) -> Option<&str> {
        match self {
            CorrectAnswer::Single(s) => Some(s.as_str()),
            CorrectAnswer::AnyOf(_) => None,
        }
    }
}

/// A student's verbatim answer: option text, free text, or a true/false flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Flag(bool),
    Text(String),
}

impl AnswerValue {
    /// Text form used for comparison. Flags render as `"true"` / `"false"`.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            AnswerValue::Flag(true) => Cow::Borrowed("true"),
            AnswerValue::Flag(false) => Cow::Borrowed("false"),
            AnswerValue::Text(s) => Cow::Borrowed(s.as_str()),
        }
    }
}

/// Upper bound on the points of a single question.
pub const MAX_QUESTION_POINTS: i32 = 1000;

fn default_points() -> i32 {
    1
}

/// One question of an exam, answer key included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,

    #[serde(rename = "type")]
    pub question_type: QuestionType,

    /// Only meaningful for multiple-choice questions.
    #[serde(default)]
    pub options: Vec<String>,

    pub correct_answer: CorrectAnswer,

    #[serde(default = "default_points")]
    pub points: i32,

    /// Shown to the student once the attempt is graded.
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// Checks that `value` has a shape this question can grade.
    pub fn check_answer_shape(&self, value: &AnswerValue) -> Result<(), ExamError> {
        match (self.question_type, value) {
            (QuestionType::TrueFalse, _) => Ok(()),
            (_, AnswerValue::Text(_)) => Ok(()),
            (kind, AnswerValue::Flag(_)) => Err(ExamError::Validation(format!(
                "a {kind:?} question expects a text answer, not a boolean"
            ))),
        }
    }

    fn validate(&self, index: usize) -> Result<(), ExamError> {
        if !(1..=MAX_QUESTION_POINTS).contains(&self.points) {
            return Err(ExamError::MalformedExam(format!(
                "question {index} has points {} outside 1..={MAX_QUESTION_POINTS}",
                self.points
            )));
        }

        match self.question_type {
            QuestionType::MultipleChoice => {
                let key = self.correct_answer.as_single().ok_or_else(|| {
                    ExamError::MalformedExam(format!(
                        "multiple-choice question {index} must have a single correct answer"
                    ))
                })?;
                if self.options.is_empty() {
                    return Err(ExamError::MalformedExam(format!(
                        "multiple-choice question {index} has no options"
                    )));
                }
                if !self.options.iter().any(|o| o.trim() == key.trim()) {
                    return Err(ExamError::MalformedExam(format!(
                        "correct answer of question {index} is not among its options"
                    )));
                }
            }
            QuestionType::TrueFalse => match self.correct_answer.as_single().map(str::trim) {
                Some("true") | Some("false") => {}
                _ => {
                    return Err(ExamError::MalformedExam(format!(
                        "true-false question {index} must be keyed \"true\" or \"false\""
                    )));
                }
            },
            QuestionType::ShortAnswer => {
                if let CorrectAnswer::AnyOf(accepted) = &self.correct_answer {
                    if accepted.is_empty() {
                        return Err(ExamError::MalformedExam(format!(
                            "short-answer question {index} accepts no answers"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Represents the 'exams' table in the database.
/// Questions are stored as a JSON array, in presentation order.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub title: String,
    pub course_id: i64,
    pub questions: Json<Vec<Question>>,
    pub duration_seconds: i32,

    /// Always equal to the sum of question points.
    pub total_score: i32,

    pub passing_score: Option<i32>,
    pub is_active: bool,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Exam {
    /// Sum of all question points, derived from the questions themselves.
    /// `None` if the points do not fit in an `i32`.
    pub fn computed_total(&self) -> Option<i32> {
        sum_points(&self.questions)
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.duration_seconds))
    }

    /// Checks every definitional invariant. Failures are data-integrity
    /// faults of the catalog, reported as `MalformedExam`.
    pub fn validate(&self) -> Result<(), ExamError> {
        if self.duration_seconds <= 0 {
            return Err(ExamError::MalformedExam(format!(
                "exam {} has non-positive duration",
                self.id
            )));
        }

        for (index, question) in self.questions.iter().enumerate() {
            question.validate(index)?;
        }

        let computed = self.computed_total().ok_or_else(|| {
            ExamError::MalformedExam(format!("exam {} has too many points", self.id))
        })?;
        if computed <= 0 {
            return Err(ExamError::MalformedExam(format!(
                "exam {} has a non-positive total score ({computed})",
                self.id
            )));
        }
        if computed != self.total_score {
            return Err(ExamError::MalformedExam(format!(
                "exam {} declares total score {} but its questions sum to {}",
                self.id, self.total_score, computed
            )));
        }

        Ok(())
    }
}

/// Sum of question points, or `None` on overflow.
pub fn sum_points(questions: &[Question]) -> Option<i32> {
    questions
        .iter()
        .try_fold(0i32, |total, q| total.checked_add(q.points))
}

/// DTO for sending a question to the student (no answer key, no explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub index: usize,
    pub text: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub options: Vec<String>,
    pub points: i32,
}

/// DTO for sending an exam definition to the student.
#[derive(Debug, Serialize)]
pub struct PublicExam {
    pub id: i64,
    pub title: String,
    pub course_id: i64,
    pub duration_seconds: i32,
    pub total_score: i32,
    pub passing_score: Option<i32>,
    pub questions: Vec<PublicQuestion>,
}

impl From<&Exam> for PublicExam {
    fn from(exam: &Exam) -> Self {
        Self {
            id: exam.id,
            title: exam.title.clone(),
            course_id: exam.course_id,
            duration_seconds: exam.duration_seconds,
            total_score: exam.total_score,
            passing_score: exam.passing_score,
            questions: exam
                .questions
                .iter()
                .enumerate()
                .map(|(index, q)| PublicQuestion {
                    index,
                    text: q.text.clone(),
                    question_type: q.question_type,
                    options: q.options.clone(),
                    points: q.points,
                })
                .collect(),
        }
    }
}

/// DTO for creating an exam definition. `total_score` is never accepted;
/// it is recomputed from the questions.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub course_id: i64,
    #[validate(length(min = 1, max = 200), custom(function = validate_questions))]
    pub questions: Vec<Question>,
    #[validate(range(min = 1, max = 86400))]
    pub duration_seconds: i32,
    #[validate(range(min = 0))]
    pub passing_score: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

fn validate_questions(questions: &[Question]) -> Result<(), validator::ValidationError> {
    for q in questions {
        if q.text.is_empty() || q.text.len() > 2000 {
            return Err(validator::ValidationError::new("question_text_length"));
        }
        if q.options.iter().any(|o| o.len() > 500) {
            return Err(validator::ValidationError::new("option_too_long"));
        }
        if !(1..=MAX_QUESTION_POINTS).contains(&q.points) {
            return Err(validator::ValidationError::new("points_out_of_range"));
        }
        if q.explanation.as_ref().is_some_and(|e| e.len() > 2000) {
            return Err(validator::ValidationError::new("explanation_too_long"));
        }
    }
    Ok(())
}

impl CreateExamRequest {
    /// Sanitizes the author-supplied text and builds the definition that will
    /// be stored, with `total_score` derived from the questions.
    pub fn into_exam(self, id: i64) -> Exam {
        let questions: Vec<Question> = self
            .questions
            .into_iter()
            .map(|q| Question {
                text: clean_html(&q.text),
                options: q.options.iter().map(|o| clean_html(o)).collect(),
                explanation: q.explanation.as_deref().map(clean_html),
                ..q
            })
            .collect();

        Exam {
            id,
            title: clean_html(&self.title),
            course_id: self.course_id,
            // An overflowing sum is left at zero for `Exam::validate` to reject.
            total_score: sum_points(&questions).unwrap_or_default(),
            questions: Json(questions),
            duration_seconds: self.duration_seconds,
            passing_score: self.passing_score,
            is_active: self.is_active,
            created_at: Some(chrono::Utc::now()),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn mc(text: &str, correct: &str, points: i32) -> Question {
        Question {
            text: text.to_string(),
            question_type: QuestionType::MultipleChoice,
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_answer: CorrectAnswer::Single(correct.to_string()),
            points,
            explanation: Some(format!("The answer is {correct}")),
        }
    }

    pub fn exam(questions: Vec<Question>, passing_score: Option<i32>) -> Exam {
        Exam {
            id: 1,
            title: "Algebra I".into(),
            course_id: 7,
            total_score: sum_points(&questions).unwrap_or_default(),
            questions: Json(questions),
            duration_seconds: 60,
            passing_score,
            is_active: true,
            created_at: None,
        }
    }
}
