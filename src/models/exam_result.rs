// src/models/exam_result.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, types::Json};
use uuid::Uuid;

use crate::{
    exam::{error::ExamError, grading::round_percentage},
    models::exam::{AnswerValue, Exam},
};

/// Final answers of an attempt, keyed by question index.
pub type AnswerSheet = BTreeMap<usize, AnswerValue>;

/// Represents the 'exam_results' table in the database.
/// Written once per attempt and never updated.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: i64,

    /// Session id of the attempt; unique across all results.
    pub attempt_token: Uuid,

    pub student_id: i64,
    pub exam_id: i64,
    pub score: i32,
    pub total_score: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub answers: Json<AnswerSheet>,
    pub completed_at: DateTime<Utc>,

    /// Seconds, clamped to the exam duration.
    pub time_spent: i32,
}

/// A graded attempt that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExamResult {
    pub student_id: i64,
    pub exam_id: i64,
    pub score: i32,
    pub total_score: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub answers: AnswerSheet,
    pub completed_at: DateTime<Utc>,
    pub time_spent: i32,
}

impl NewExamResult {
    /// Rejects a record whose score, total and percentage disagree.
    pub fn verify(&self) -> Result<(), ExamError> {
        if self.total_score <= 0 {
            return Err(ExamError::Validation(format!(
                "total score must be positive, got {}",
                self.total_score
            )));
        }
        if self.score < 0 || self.score > self.total_score {
            return Err(ExamError::Validation(format!(
                "score {} is outside 0..={}",
                self.score, self.total_score
            )));
        }

        let expected = round_percentage(self.score, self.total_score);
        if (self.percentage - expected).abs() > 1e-9 {
            return Err(ExamError::Validation(format!(
                "percentage {} does not match score {}/{} (expected {})",
                self.percentage, self.score, self.total_score, expected
            )));
        }

        if self.time_spent < 0 {
            return Err(ExamError::Validation("time spent cannot be negative".to_string()));
        }

        Ok(())
    }

    /// `verify` plus the checks that need the exam: matching id and total,
    /// time spent within the duration, and a verdict agreeing with the
    /// passing score when the exam defines one.
    pub fn verify_for(&self, exam: &Exam) -> Result<(), ExamError> {
        self.verify()?;

        if self.exam_id != exam.id || self.total_score != exam.total_score {
            return Err(ExamError::Validation(format!(
                "result for exam {} (total {}) does not belong to exam {} (total {})",
                self.exam_id, self.total_score, exam.id, exam.total_score
            )));
        }
        if self.time_spent > exam.duration_seconds {
            return Err(ExamError::Validation(format!(
                "time spent {}s exceeds the {}s duration",
                self.time_spent, exam.duration_seconds
            )));
        }
        if let Some(threshold) = exam.passing_score {
            if self.is_passed != (self.score >= threshold) {
                return Err(ExamError::Validation(format!(
                    "verdict disagrees with passing score {threshold} for score {}",
                    self.score
                )));
            }
        }

        Ok(())
    }

    pub fn into_result(self, id: i64, attempt_token: Uuid) -> ExamResult {
        ExamResult {
            id,
            attempt_token,
            student_id: self.student_id,
            exam_id: self.exam_id,
            score: self.score,
            total_score: self.total_score,
            percentage: self.percentage,
            is_passed: self.is_passed,
            answers: Json(self.answers),
            completed_at: self.completed_at,
            time_spent: self.time_spent,
        }
    }
}

/// Aggregated figures over every stored result of one exam.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExamStatistics {
    pub exam_id: i64,
    pub attempts: usize,
    pub passed: usize,
    pub average_percentage: f64,
    pub highest_score: Option<i32>,
    pub pass_rate: f64,
}

impl ExamStatistics {
    pub fn from_results(exam_id: i64, results: &[ExamResult]) -> Self {
        let attempts = results.len();
        let passed = results.iter().filter(|r| r.is_passed).count();
        let average = if attempts == 0 {
            0.0
        } else {
            results.iter().map(|r| r.percentage).sum::<f64>() / attempts as f64
        };

        Self::from_counts(
            exam_id,
            attempts,
            passed,
            average,
            results.iter().map(|r| r.score).max(),
        )
    }

    /// Builds the figures from pre-aggregated counts (e.g. a SQL `GROUP BY`).
    pub fn from_counts(
        exam_id: i64,
        attempts: usize,
        passed: usize,
        average_percentage: f64,
        highest_score: Option<i32>,
    ) -> Self {
        let pass_rate = if attempts == 0 {
            0.0
        } else {
            passed as f64 / attempts as f64 * 100.0
        };

        Self {
            exam_id,
            attempts,
            passed,
            average_percentage: round2(average_percentage),
            highest_score,
            pass_rate: round2(pass_rate),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Query string for listing a student's own results.
#[derive(Debug, Deserialize)]
pub struct ResultListParams {
    pub exam_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_result(score: i32, total: i32, percentage: f64) -> NewExamResult {
        NewExamResult {
            student_id: 1,
            exam_id: 1,
            score,
            total_score: total,
            percentage,
            is_passed: false,
            answers: AnswerSheet::new(),
            completed_at: Utc::now(),
            time_spent: 10,
        }
    }

    #[test]
    fn test_verify_accepts_consistent_record() {
        assert!(new_result(1, 3, 33.33).verify().is_ok());
        assert!(new_result(2, 2, 100.0).verify().is_ok());
    }

    #[test]
    fn test_verify_rejects_inflated_percentage() {
        assert!(matches!(
            new_result(1, 2, 100.0).verify(),
            Err(ExamError::Validation(_))
        ));
    }

    #[test]
    fn test_verify_rejects_score_above_total() {
        assert!(new_result(5, 2, 250.0).verify().is_err());
        assert!(new_result(0, 0, 0.0).verify().is_err());
    }

    #[test]
    fn test_verify_for_checks_against_exam() {
        use crate::models::exam::fixtures::{exam, mc};

        // Two one-point questions, 60s, passing score 2.
        let e = exam(vec![mc("Q1", "A", 1), mc("Q2", "B", 1)], Some(2));
        let mut ok = new_result(2, 2, 100.0);
        ok.is_passed = true;
        assert!(ok.verify_for(&e).is_ok());

        let wrong_verdict = new_result(2, 2, 100.0);
        assert!(matches!(wrong_verdict.verify_for(&e), Err(ExamError::Validation(_))));

        let mut overtime = ok.clone();
        overtime.time_spent = 61;
        assert!(matches!(overtime.verify_for(&e), Err(ExamError::Validation(_))));

        let mut other_exam = ok.clone();
        other_exam.exam_id = 2;
        assert!(other_exam.verify_for(&e).is_err());
    }

    #[test]
    fn test_statistics() {
        let token = Uuid::new_v4();
        let results: Vec<ExamResult> = [(2, true), (1, false), (2, true)]
            .into_iter()
            .enumerate()
            .map(|(i, (score, passed))| {
                let mut r = new_result(score, 2, round_percentage(score, 2));
                r.is_passed = passed;
                r.into_result(i as i64, token)
            })
            .collect();

        let stats = ExamStatistics::from_results(1, &results);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.highest_score, Some(2));
        assert_eq!(stats.average_percentage, 83.33);
        assert_eq!(stats.pass_rate, 66.67);
    }

    #[test]
    fn test_statistics_empty() {
        let stats = ExamStatistics::from_results(4, &[]);
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.highest_score, None);
    }

    #[test]
    fn test_answer_sheet_json_keys() {
        let mut sheet = AnswerSheet::new();
        sheet.insert(0, AnswerValue::Text("A".into()));
        sheet.insert(2, AnswerValue::Flag(false));
        let json = serde_json::to_string(&sheet).unwrap();
        assert_eq!(json, r#"{"0":"A","2":false}"#);
        let back: AnswerSheet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sheet);
    }
}
