//! Lifecycle of one attempt: NotStarted → InProgress → Submitted → Graded.
//!
//! Every transition is guarded by the current status. The guard, not timer
//! cancellation, is what keeps a manual submit and a timeout from both
//! reaching the grading step.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    answers::AnswerCollector,
    deadline::DeadlineManager,
    error::ExamError,
    grading::{self, GradeOutcome, PassPolicy},
};
use crate::models::{
    exam::{AnswerValue, Exam},
    exam_result::{AnswerSheet, ExamResult, NewExamResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Submitted,
    Graded,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::NotStarted => "not started",
            SessionStatus::InProgress => "in progress",
            SessionStatus::Submitted => "submitted",
            SessionStatus::Graded => "graded",
        };
        f.write_str(name)
    }
}

/// What caused the submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    Manual,
    Timeout,
}

/// Outcome of a `record_answer` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerAck {
    Recorded,
    /// Arrived after the deadline or after submission; dropped on purpose.
    Ignored,
}

/// The frozen state of a submitted attempt.
#[derive(Debug, Clone)]
pub struct Submission {
    pub trigger: SubmitTrigger,
    pub answers: Arc<AnswerSheet>,
    pub completed_at: DateTime<Utc>,
    pub time_spent: i32,
}

/// Grading output, plus the stored record once the sink accepted it.
#[derive(Debug, Clone)]
pub struct Graded {
    pub outcome: GradeOutcome,
    pub pending: NewExamResult,
    pub stored: Option<ExamResult>,
}

#[derive(Debug)]
pub struct ExamSession {
    id: Uuid,
    exam: Arc<Exam>,
    student_id: i64,
    status: SessionStatus,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DeadlineManager>,
    answers: AnswerCollector,
    current_question_index: usize,
    submission: Option<Submission>,
    graded: Option<Graded>,
}

impl ExamSession {
    /// Creates a session in `NotStarted`. The exam is owned by the session
    /// for its whole life and never re-fetched.
    pub fn new(id: Uuid, exam: Arc<Exam>, student_id: i64) -> Self {
        Self {
            id,
            exam,
            student_id,
            status: SessionStatus::NotStarted,
            started_at: None,
            deadline: None,
            answers: AnswerCollector::new(),
            current_question_index: 0,
            submission: None,
            graded: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn exam(&self) -> &Arc<Exam> {
        &self.exam
    }

    pub fn student_id(&self) -> i64 {
        self.student_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline.as_ref().map(DeadlineManager::deadline)
    }

    pub fn deadline_manager_mut(&mut self) -> Option<&mut DeadlineManager> {
        self.deadline.as_mut()
    }

    pub fn current_question_index(&self) -> usize {
        self.current_question_index
    }

    pub fn answers(&self) -> &AnswerCollector {
        &self.answers
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn graded(&self) -> Option<&Graded> {
        self.graded.as_ref()
    }

    /// Seconds left, rounded up so a running attempt never shows zero.
    /// Zero outside `InProgress`.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        match (&self.deadline, self.status) {
            (Some(deadline), SessionStatus::InProgress) => {
                let millis = deadline.remaining(now).num_milliseconds();
                (millis + 999).div_euclid(1000)
            }
            _ => 0,
        }
    }

    /// `true` while in progress with the deadline already reached.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::InProgress
            && self.deadline.as_ref().is_some_and(|d| d.is_expired(now))
    }

    fn invalid(&self, operation: &'static str) -> ExamError {
        ExamError::InvalidState {
            status: self.status,
            operation,
        }
    }

    /// NotStarted → InProgress. Returns the deadline.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ExamError> {
        if self.status != SessionStatus::NotStarted {
            return Err(self.invalid("start"));
        }
        if !self.exam.is_active {
            return Err(ExamError::InactiveExam(self.exam.id));
        }
        self.exam.validate()?;

        let deadline = now + self.exam.duration();
        self.started_at = Some(now);
        self.deadline = Some(DeadlineManager::new(deadline));
        self.answers = AnswerCollector::new();
        self.status = SessionStatus::InProgress;

        Ok(deadline)
    }

    fn check_index(&self, index: usize) -> Result<(), ExamError> {
        let len = self.exam.questions.len();
        if index >= len {
            return Err(ExamError::Validation(format!(
                "question index {index} is out of range (exam has {len} questions)"
            )));
        }
        Ok(())
    }

    /// Stores or overwrites an answer while in progress.
    ///
    /// Writes landing after the deadline or after submission are ignored.
    /// A graded session rejects them.
    pub fn record_answer(
        &mut self,
        index: usize,
        value: AnswerValue,
        now: DateTime<Utc>,
    ) -> Result<AnswerAck, ExamError> {
        match self.status {
            SessionStatus::NotStarted | SessionStatus::Graded => {
                return Err(self.invalid("record an answer"));
            }
            SessionStatus::Submitted => return Ok(AnswerAck::Ignored),
            SessionStatus::InProgress => {}
        }

        self.check_index(index)?;
        self.exam.questions[index].check_answer_shape(&value)?;

        if self.is_overdue(now) {
            return Ok(AnswerAck::Ignored);
        }

        self.answers.set(index, value);
        Ok(AnswerAck::Recorded)
    }

    /// Moves the UI cursor. Has no bearing on scoring.
    pub fn navigate(&mut self, index: usize) -> Result<(), ExamError> {
        if self.status != SessionStatus::InProgress {
            return Err(self.invalid("navigate"));
        }
        self.check_index(index)?;
        self.current_question_index = index;
        Ok(())
    }

    /// InProgress → Submitted. Freezes the answers and stops the timer.
    pub fn submit(
        &mut self,
        trigger: SubmitTrigger,
        now: DateTime<Utc>,
    ) -> Result<&Submission, ExamError> {
        if self.status != SessionStatus::InProgress {
            return Err(self.invalid("submit"));
        }

        if let Some(deadline) = self.deadline.as_mut() {
            deadline.cancel();
        }

        let started_at = self.started_at.unwrap_or(now);
        // Nearest whole second, so a timer waking a few ms early still counts the full duration.
        let elapsed = ((now - started_at).num_milliseconds() + 500).div_euclid(1000);
        let time_spent = elapsed.clamp(0, i64::from(self.exam.duration_seconds)) as i32;

        self.status = SessionStatus::Submitted;
        Ok(self.submission.insert(Submission {
            trigger,
            answers: self.answers.snapshot(),
            completed_at: now,
            time_spent,
        }))
    }

    /// Submitted → Graded. Runs the grading engine on the frozen answers.
    pub fn grade(&mut self, policy: PassPolicy) -> Result<&Graded, ExamError> {
        if self.status != SessionStatus::Submitted {
            return Err(self.invalid("grade"));
        }
        let submission = self
            .submission
            .as_ref()
            .ok_or_else(|| self.invalid("grade"))?;

        let outcome = grading::grade(
            &self.exam.questions,
            &submission.answers,
            self.exam.passing_score,
            policy,
        )?;

        let pending = NewExamResult {
            student_id: self.student_id,
            exam_id: self.exam.id,
            score: outcome.score,
            total_score: outcome.total_score,
            percentage: outcome.percentage,
            is_passed: outcome.is_passed,
            answers: submission.answers.as_ref().clone(),
            completed_at: submission.completed_at,
            time_spent: submission.time_spent,
        };
        pending.verify_for(&self.exam)?;

        self.status = SessionStatus::Graded;
        Ok(self.graded.insert(Graded {
            outcome,
            pending,
            stored: None,
        }))
    }

    /// Remembers the record the sink stored for this attempt.
    pub fn attach_record(&mut self, stored: ExamResult) -> Result<(), ExamError> {
        match self.graded.as_mut() {
            Some(graded) => {
                graded.stored = Some(stored);
                Ok(())
            }
            None => Err(self.invalid("attach a result")),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::exam::fixtures::{exam, mc};

    fn session(passing: Option<i32>) -> ExamSession {
        let e = exam(vec![mc("Q1", "A", 1), mc("Q2", "B", 1)], passing);
        ExamSession::new(Uuid::new_v4(), Arc::new(e), 42)
    }

    fn text(s: &str) -> AnswerValue {
        AnswerValue::Text(s.to_string())
    }

    #[test]
    fn test_full_lifecycle() {
        let t0 = Utc::now();
        let mut s = session(Some(1));
        assert_eq!(s.status(), SessionStatus::NotStarted);

        let deadline = s.start(t0).unwrap();
        assert_eq!(deadline, t0 + Duration::seconds(60));
        assert_eq!(s.remaining_seconds(t0 + Duration::seconds(20)), 40);

        assert_eq!(s.record_answer(0, text("A"), t0).unwrap(), AnswerAck::Recorded);
        assert_eq!(s.record_answer(1, text("B"), t0).unwrap(), AnswerAck::Recorded);

        let sub = s.submit(SubmitTrigger::Manual, t0 + Duration::seconds(30)).unwrap();
        assert_eq!(sub.time_spent, 30);
        assert_eq!(s.status(), SessionStatus::Submitted);

        let graded = s.grade(PassPolicy::Never).unwrap();
        assert_eq!(graded.outcome.score, 2);
        assert_eq!(graded.pending.percentage, 100.0);
        assert!(graded.pending.is_passed);
        assert_eq!(s.status(), SessionStatus::Graded);
    }

    #[test]
    fn test_start_rejects_inactive_and_malformed() {
        let mut inactive = exam(vec![mc("Q1", "A", 1)], None);
        inactive.is_active = false;
        let mut s = ExamSession::new(Uuid::new_v4(), Arc::new(inactive), 1);
        assert!(matches!(s.start(Utc::now()), Err(ExamError::InactiveExam(1))));
        assert_eq!(s.status(), SessionStatus::NotStarted);

        let broken = exam(vec![mc("Q1", "nope", 1)], None);
        let mut s = ExamSession::new(Uuid::new_v4(), Arc::new(broken), 1);
        assert!(matches!(s.start(Utc::now()), Err(ExamError::MalformedExam(_))));
    }

    #[test]
    fn test_second_submit_is_invalid_state() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();
        s.submit(SubmitTrigger::Manual, t0).unwrap();

        let again = s.submit(SubmitTrigger::Timeout, t0 + Duration::seconds(60));
        assert!(matches!(
            again,
            Err(ExamError::InvalidState {
                status: SessionStatus::Submitted,
                ..
            })
        ));
        assert_eq!(s.submission().unwrap().trigger, SubmitTrigger::Manual);
    }

    #[test]
    fn test_graded_session_never_regresses() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();
        s.submit(SubmitTrigger::Manual, t0).unwrap();
        s.grade(PassPolicy::Never).unwrap();

        assert!(matches!(s.start(t0), Err(ExamError::InvalidState { .. })));
        assert!(matches!(
            s.record_answer(0, text("A"), t0),
            Err(ExamError::InvalidState { .. })
        ));
        assert!(matches!(
            s.submit(SubmitTrigger::Manual, t0),
            Err(ExamError::InvalidState { .. })
        ));
        assert!(matches!(s.grade(PassPolicy::Never), Err(ExamError::InvalidState { .. })));
        assert_eq!(s.status(), SessionStatus::Graded);
    }

    #[test]
    fn test_record_answer_validates_index_and_shape() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();

        assert!(matches!(
            s.record_answer(2, text("A"), t0),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(
            s.record_answer(0, AnswerValue::Flag(true), t0),
            Err(ExamError::Validation(_))
        ));
        assert!(matches!(s.navigate(5), Err(ExamError::Validation(_))));
        s.navigate(1).unwrap();
        assert_eq!(s.current_question_index(), 1);
    }

    #[test]
    fn test_late_answers_are_ignored() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();
        s.record_answer(0, text("A"), t0).unwrap();

        let late = s.record_answer(1, text("B"), t0 + Duration::seconds(61)).unwrap();
        assert_eq!(late, AnswerAck::Ignored);
        assert!(s.is_overdue(t0 + Duration::seconds(61)));

        s.submit(SubmitTrigger::Timeout, t0 + Duration::seconds(61)).unwrap();
        let after = s.record_answer(1, text("B"), t0 + Duration::seconds(62)).unwrap();
        assert_eq!(after, AnswerAck::Ignored);

        let frozen = &s.submission().unwrap().answers;
        assert_eq!(frozen.len(), 1);
    }

    #[test]
    fn test_time_spent_is_clamped_to_duration() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();
        let sub = s.submit(SubmitTrigger::Timeout, t0 + Duration::hours(5)).unwrap();
        assert_eq!(sub.time_spent, 60);
        assert_eq!(s.remaining_seconds(t0), 0);
    }

    #[test]
    fn test_remaining_seconds_round_up() {
        let t0 = Utc::now();
        let mut s = session(None);
        s.start(t0).unwrap();

        assert_eq!(s.remaining_seconds(t0), 60);
        assert_eq!(s.remaining_seconds(t0 + Duration::milliseconds(59_600)), 1);
        assert_eq!(s.remaining_seconds(t0 + Duration::milliseconds(59_000)), 1);
        assert_eq!(s.remaining_seconds(t0 + Duration::milliseconds(58_999)), 2);
        assert_eq!(s.remaining_seconds(t0 + Duration::seconds(60)), 0);
        assert_eq!(s.remaining_seconds(t0 + Duration::seconds(90)), 0);
    }

    #[test]
    fn test_answers_before_start_are_rejected() {
        let mut s = session(None);
        assert!(matches!(
            s.record_answer(0, text("A"), Utc::now()),
            Err(ExamError::InvalidState {
                status: SessionStatus::NotStarted,
                ..
            })
        ));
        assert!(matches!(
            s.submit(SubmitTrigger::Manual, Utc::now()),
            Err(ExamError::InvalidState { .. })
        ));
    }
}
