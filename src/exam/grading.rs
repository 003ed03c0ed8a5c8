//! Deterministic grading of a frozen answer sheet.
//!
//! Grading never looks at the clock and never trusts a score supplied by the
//! answering side: everything is recomputed from the exam definition.

use serde::Serialize;

use crate::{
    exam::error::ExamError,
    models::{
        exam::{CorrectAnswer, Question, QuestionType},
        exam_result::AnswerSheet,
    },
};

/// How `is_passed` is decided for exams without a `passing_score`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum PassPolicy {
    /// Such exams can never be passed.
    #[default]
    Never,
    /// Passed when the percentage reaches the threshold.
    MinPercentage(f64),
}

impl PassPolicy {
    pub fn from_config(default_passing_percentage: Option<f64>) -> Self {
        default_passing_percentage.map_or(PassPolicy::Never, PassPolicy::MinPercentage)
    }
}

/// Verdict for one question, kept for the post-grading review.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionOutcome {
    pub index: usize,
    pub answered: bool,
    pub correct: bool,
    pub awarded: i32,
    pub points: i32,
    pub explanation: Option<String>,
}

/// Output of a grading pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeOutcome {
    pub score: i32,
    pub total_score: i32,
    pub percentage: f64,
    pub is_passed: bool,
    pub breakdown: Vec<QuestionOutcome>,
}

/// `round(score / total * 100, 2)`. Callers guarantee `total > 0`.
pub fn round_percentage(score: i32, total: i32) -> f64 {
    let raw = f64::from(score) / f64::from(total) * 100.0;
    (raw * 100.0).round() / 100.0
}

fn is_correct(question: &Question, answer: &str) -> bool {
    match question.question_type {
        // Single keyed answer; an array key never matches a choice question.
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            matches!(question.correct_answer, CorrectAnswer::Single(_))
                && question.correct_answer.accepts(answer)
        }
        QuestionType::ShortAnswer => question.correct_answer.accepts(answer),
    }
}

fn checked_total(acc: i32, points: i32) -> Result<i32, ExamError> {
    acc.checked_add(points)
        .ok_or_else(|| ExamError::MalformedExam("exam points overflow".to_string()))
}

/// Grades `answers` against `questions`.
///
/// Unanswered questions score zero. A total of zero points is a malformed
/// exam, not a division by zero.
pub fn grade(
    questions: &[Question],
    answers: &AnswerSheet,
    passing_score: Option<i32>,
    policy: PassPolicy,
) -> Result<GradeOutcome, ExamError> {
    let mut score = 0;
    let mut total_score = 0;
    let mut breakdown = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        let answer = answers.get(&index);
        let correct = answer.is_some_and(|a| is_correct(question, &a.as_text()));
        let awarded = if correct { question.points } else { 0 };

        total_score = checked_total(total_score, question.points)?;
        score = checked_total(score, awarded)?;

        breakdown.push(QuestionOutcome {
            index,
            answered: answer.is_some(),
            correct,
            awarded,
            points: question.points,
            explanation: question.explanation.clone(),
        });
    }

    if total_score <= 0 {
        return Err(ExamError::MalformedExam(
            "exam has no points to award".to_string(),
        ));
    }

    let percentage = round_percentage(score, total_score);

    let is_passed = match (passing_score, policy) {
        (Some(threshold), _) => score >= threshold,
        (None, PassPolicy::MinPercentage(min)) => percentage >= min,
        (None, PassPolicy::Never) => false,
    };

    Ok(GradeOutcome {
        score,
        total_score,
        percentage,
        is_passed,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::exam::{AnswerValue, fixtures::mc};

    fn sheet(entries: &[(usize, AnswerValue)]) -> AnswerSheet {
        entries.iter().cloned().collect()
    }

    fn text(s: &str) -> AnswerValue {
        AnswerValue::Text(s.to_string())
    }

    #[test]
    fn test_full_pass() {
        let questions = vec![mc("Q1", "A", 1), mc("Q2", "B", 1)];
        let answers = sheet(&[(0, text("A")), (1, text("B"))]);

        let out = grade(&questions, &answers, Some(1), PassPolicy::Never).unwrap();
        assert_eq!(out.score, 2);
        assert_eq!(out.total_score, 2);
        assert_eq!(out.percentage, 100.0);
        assert!(out.is_passed);
    }

    #[test]
    fn test_partial_fail() {
        let questions = vec![mc("Q1", "A", 1), mc("Q2", "B", 1)];
        let answers = sheet(&[(0, text("A")), (1, text("C"))]);

        let out = grade(&questions, &answers, Some(2), PassPolicy::Never).unwrap();
        assert_eq!(out.score, 1);
        assert_eq!(out.percentage, 50.0);
        assert!(!out.is_passed);
        assert!(!out.breakdown[1].correct);
    }

    #[test]
    fn test_unanswered_scores_zero() {
        let questions = vec![mc("Q1", "A", 3), mc("Q2", "B", 1)];
        let answers = sheet(&[(1, text("B"))]);

        let out = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
        assert_eq!(out.score, 1);
        assert_eq!(out.total_score, 4);
        assert_eq!(out.percentage, 25.0);
        assert!(!out.breakdown[0].answered);
        assert_eq!(out.breakdown[0].awarded, 0);
    }

    #[test]
    fn test_choice_matching_is_case_sensitive_and_trimmed() {
        let questions = vec![mc("Q1", "A", 1), mc("Q2", "B", 1)];
        let answers = sheet(&[(0, text(" A\n")), (1, text("b"))]);

        let out = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
        assert_eq!(out.score, 1);
    }

    #[test]
    fn test_true_false_accepts_flag_or_text() {
        let tf = Question {
            text: "Water boils at 100C at sea level".into(),
            question_type: QuestionType::TrueFalse,
            options: vec![],
            correct_answer: CorrectAnswer::Single("true".into()),
            points: 2,
            explanation: None,
        };
        let questions = vec![tf.clone(), tf];
        let answers = sheet(&[(0, AnswerValue::Flag(true)), (1, text("True"))]);

        let out = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
        assert_eq!(out.score, 2);
    }

    #[test]
    fn test_short_answer_accepts_any_listed_literal() {
        let sa = Question {
            text: "Capital of Japan".into(),
            question_type: QuestionType::ShortAnswer,
            options: vec![],
            correct_answer: CorrectAnswer::AnyOf(vec!["Tokyo".into(), "Tōkyō".into()]),
            points: 1,
            explanation: None,
        };
        let questions = vec![sa.clone(), sa.clone(), sa];
        let answers = sheet(&[(0, text("Tōkyō")), (1, text("Tokyo ")), (2, text("Kyoto"))]);

        let out = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
        assert_eq!(out.score, 2);
        assert_eq!(out.percentage, 66.67);
    }

    #[test]
    fn test_zero_total_is_malformed() {
        let out = grade(&[], &AnswerSheet::new(), None, PassPolicy::Never);
        assert!(matches!(out, Err(ExamError::MalformedExam(_))));
    }

    #[test]
    fn test_point_overflow_is_malformed() {
        let questions = vec![mc("Q1", "A", i32::MAX), mc("Q2", "B", i32::MAX)];
        let answers = sheet(&[(0, text("A")), (1, text("B"))]);
        assert!(matches!(
            grade(&questions, &answers, None, PassPolicy::Never),
            Err(ExamError::MalformedExam(_))
        ));
    }

    #[test]
    fn test_pass_policy_without_passing_score() {
        let questions = vec![mc("Q1", "A", 1), mc("Q2", "B", 1)];
        let answers = sheet(&[(0, text("A"))]);

        let never = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
        assert!(!never.is_passed);

        let half = grade(&questions, &answers, None, PassPolicy::MinPercentage(50.0)).unwrap();
        assert!(half.is_passed);

        let strict = grade(&questions, &answers, None, PassPolicy::MinPercentage(60.0)).unwrap();
        assert!(!strict.is_passed);
    }

    #[test]
    fn test_grading_is_deterministic() {
        let questions = vec![mc("Q1", "A", 1), mc("Q2", "B", 2), mc("Q3", "C", 3)];
        let answers = sheet(&[(0, text("A")), (2, text("B"))]);

        let first = grade(&questions, &answers, Some(3), PassPolicy::Never).unwrap();
        for _ in 0..10 {
            let again = grade(&questions, &answers, Some(3), PassPolicy::Never).unwrap();
            assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&again).unwrap()
            );
        }
    }

    #[test]
    fn test_percentage_invariant_holds_for_every_score() {
        let questions: Vec<Question> = (0..7).map(|i| mc(&format!("Q{i}"), "A", i + 1)).collect();
        for mask in 0u32..(1 << 7) {
            let answers: AnswerSheet = (0..7usize)
                .filter(|i| mask & (1u32 << i) != 0)
                .map(|i| (i, text("A")))
                .collect();
            let out = grade(&questions, &answers, None, PassPolicy::Never).unwrap();
            assert_eq!(out.percentage, round_percentage(out.score, out.total_score));
            assert!((0.0..=100.0).contains(&out.percentage));
        }
    }
}
