//! Registry of live attempts and the entry point used by handlers and timers.
//!
//! Each session sits behind its own async mutex. Whoever locks an in-progress
//! session first performs the submission; later callers find it submitted
//! and receive the recorded result instead of an error.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    clock::Clock,
    error::ExamError,
    grading::PassPolicy,
    session::{AnswerAck, ExamSession, SessionStatus, SubmitTrigger},
};
use crate::{
    models::{
        attempt::{AnswerReceipt, AttemptView, StartedAttempt, SubmitOutcome},
        exam::{AnswerValue, Exam, PublicExam},
    },
    store::{ExamStore, ResultSink},
};

type SessionHandle = Arc<AsyncMutex<ExamSession>>;

struct Inner {
    exams: Arc<dyn ExamStore>,
    results: Arc<dyn ResultSink>,
    clock: Arc<dyn Clock>,
    policy: PassPolicy,
    sessions: Mutex<HashMap<Uuid, SessionHandle>>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("live_sessions", &self.live_sessions())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        exams: Arc<dyn ExamStore>,
        results: Arc<dyn ResultSink>,
        clock: Arc<dyn Clock>,
        policy: PassPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                exams,
                results,
                clock,
                policy,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionHandle>> {
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Number of attempts that are started but not yet recorded.
    pub fn live_sessions(&self) -> usize {
        self.sessions().len()
    }

    fn discard(&self, session_id: Uuid) {
        self.sessions().remove(&session_id);
    }

    /// Fetches an exam definition from the catalog.
    pub async fn fetch_exam(&self, exam_id: i64) -> Result<Exam, ExamError> {
        self.inner
            .exams
            .fetch_exam(exam_id)
            .await?
            .ok_or_else(|| ExamError::NotFound(format!("exam {exam_id}")))
    }

    /// Starts a new attempt and arms its deadline timer.
    pub async fn start_attempt(
        &self,
        exam_id: i64,
        student_id: i64,
    ) -> Result<StartedAttempt, ExamError> {
        let exam = Arc::new(self.fetch_exam(exam_id).await?);
        let session_id = Uuid::new_v4();
        let now = self.now();

        let mut session = ExamSession::new(session_id, exam.clone(), student_id);
        let deadline = session.start(now)?;

        let handle = Arc::new(AsyncMutex::new(session));
        self.sessions().insert(session_id, handle.clone());

        // Armed only after registration so an immediate expiry can find the session.
        {
            let mut session = handle.lock().await;
            let expiry = expire(Arc::downgrade(&self.inner), session_id, student_id);
            if let Some(timer) = session.deadline_manager_mut() {
                timer.arm(now, expiry);
            }
        }

        tracing::info!(
            %session_id,
            exam_id,
            student_id,
            %deadline,
            "Attempt started"
        );

        Ok(StartedAttempt {
            session_id,
            status: SessionStatus::InProgress,
            started_at: now,
            deadline,
            remaining_seconds: (deadline - now).num_seconds(),
            exam: PublicExam::from(exam.as_ref()),
        })
    }

    async fn lock(
        &self,
        session_id: Uuid,
        student_id: i64,
    ) -> Option<Result<OwnedMutexGuard<ExamSession>, ExamError>> {
        let handle = self.sessions().get(&session_id).cloned()?;
        let session = handle.lock_owned().await;

        if session.student_id() != student_id {
            return Some(Err(ExamError::NotFound(format!("attempt {session_id}"))));
        }
        Some(Ok(session))
    }

    /// Looks up the stored result of an attempt whose live session is gone.
    async fn recorded(&self, session_id: Uuid, student_id: i64) -> Result<SubmitOutcome, ExamError> {
        match self.inner.results.find_by_token(session_id).await? {
            Some(result) if result.student_id == student_id => Ok(SubmitOutcome {
                result,
                duplicate: true,
                review: None,
            }),
            _ => Err(ExamError::NotFound(format!("attempt {session_id}"))),
        }
    }

    /// Forces the timeout submission if the deadline passed unobserved,
    /// e.g. while the process was suspended.
    async fn enforce_deadline(&self, session: &mut ExamSession) -> Result<(), ExamError> {
        if session.is_overdue(self.now()) {
            tracing::info!(session_id = %session.id(), "Deadline already passed, forcing submission");
            self.finish(session, SubmitTrigger::Timeout).await?;
        }
        Ok(())
    }

    /// Drives a session from wherever it is to a recorded result.
    async fn finish(
        &self,
        session: &mut ExamSession,
        trigger: SubmitTrigger,
    ) -> Result<SubmitOutcome, ExamError> {
        let session_id = session.id();

        if let Some(graded) = session.graded() {
            if let Some(stored) = &graded.stored {
                tracing::debug!(%session_id, ?trigger, "Attempt already submitted");
                return Ok(SubmitOutcome {
                    result: stored.clone(),
                    duplicate: true,
                    review: Some(graded.outcome.breakdown.clone()),
                });
            }
        }

        if session.status() == SessionStatus::InProgress {
            let submission = session.submit(trigger, self.now())?;
            tracing::info!(
                %session_id,
                ?trigger,
                answered = submission.answers.len(),
                time_spent = submission.time_spent,
                "Attempt submitted"
            );
        }

        if session.status() == SessionStatus::Submitted {
            if let Err(e) = session.grade(self.inner.policy) {
                if matches!(e, ExamError::MalformedExam(_)) {
                    tracing::error!(%session_id, "Cannot grade attempt: {}", e);
                    self.discard(session_id);
                }
                return Err(e);
            }
        }

        let graded = session.graded().ok_or(ExamError::InvalidState {
            status: session.status(),
            operation: "submit",
        })?;
        let pending = graded.pending.clone();
        let review = graded.outcome.breakdown.clone();

        // Idempotent on the session id; a retry after a storage failure lands here again.
        let stored = self.inner.results.record(session_id, &pending).await?;
        session.attach_record(stored.clone())?;
        self.discard(session_id);

        tracing::info!(
            %session_id,
            result_id = stored.id,
            score = stored.score,
            total_score = stored.total_score,
            passed = stored.is_passed,
            "Attempt graded"
        );

        Ok(SubmitOutcome {
            result: stored,
            duplicate: false,
            review: Some(review),
        })
    }

    /// Submits an attempt. Repeated calls return the original result with
    /// `duplicate` set.
    pub async fn submit(
        &self,
        session_id: Uuid,
        student_id: i64,
        trigger: SubmitTrigger,
    ) -> Result<SubmitOutcome, ExamError> {
        match self.lock(session_id, student_id).await {
            Some(session) => {
                let mut session = session?;
                self.finish(&mut session, trigger).await
            }
            None => self.recorded(session_id, student_id).await,
        }
    }

    /// Records an answer. Late answers are acknowledged with `accepted: false`.
    pub async fn record_answer(
        &self,
        session_id: Uuid,
        student_id: i64,
        question_index: usize,
        value: AnswerValue,
    ) -> Result<AnswerReceipt, ExamError> {
        let Some(session) = self.lock(session_id, student_id).await else {
            self.recorded(session_id, student_id).await?;
            return Ok(AnswerReceipt {
                accepted: false,
                status: SessionStatus::Graded,
                remaining_seconds: 0,
            });
        };
        let mut session = session?;

        self.enforce_deadline(&mut session).await?;

        let ack = match session.record_answer(question_index, value, self.now()) {
            Ok(ack) => ack,
            Err(ExamError::InvalidState {
                status: SessionStatus::Graded,
                ..
            }) => AnswerAck::Ignored,
            Err(e) => return Err(e),
        };

        if ack == AnswerAck::Ignored {
            tracing::debug!(%session_id, question_index, "Late answer ignored");
        }

        Ok(AnswerReceipt {
            accepted: ack == AnswerAck::Recorded,
            status: session.status(),
            remaining_seconds: session.remaining_seconds(self.now()),
        })
    }

    /// Moves the question cursor of an in-progress attempt.
    pub async fn navigate(
        &self,
        session_id: Uuid,
        student_id: i64,
        question_index: usize,
    ) -> Result<AttemptView, ExamError> {
        let Some(session) = self.lock(session_id, student_id).await else {
            self.recorded(session_id, student_id).await?;
            return Err(ExamError::InvalidState {
                status: SessionStatus::Graded,
                operation: "navigate",
            });
        };
        let mut session = session?;

        self.enforce_deadline(&mut session).await?;
        session.navigate(question_index)?;
        Ok(self.view(&session))
    }

    /// Current state of an attempt. Expires it first if the deadline passed.
    pub async fn observe(&self, session_id: Uuid, student_id: i64) -> Result<AttemptView, ExamError> {
        let Some(session) = self.lock(session_id, student_id).await else {
            let recorded = self.recorded(session_id, student_id).await?;
            return Ok(AttemptView {
                session_id,
                exam_id: recorded.result.exam_id,
                status: SessionStatus::Graded,
                started_at: None,
                deadline: None,
                remaining_seconds: 0,
                current_question_index: 0,
                answers: recorded.result.answers.0.clone(),
                result: Some(recorded.result),
            });
        };
        let mut session = session?;

        self.enforce_deadline(&mut session).await?;
        Ok(self.view(&session))
    }

    fn view(&self, session: &ExamSession) -> AttemptView {
        let answers = match session.submission() {
            Some(submission) => submission.answers.as_ref().clone(),
            None => Arc::unwrap_or_clone(session.answers().snapshot()),
        };

        AttemptView {
            session_id: session.id(),
            exam_id: session.exam().id,
            status: session.status(),
            started_at: session.started_at(),
            deadline: session.deadline(),
            remaining_seconds: session.remaining_seconds(self.now()),
            current_question_index: session.current_question_index(),
            answers,
            result: session.graded().and_then(|g| g.stored.clone()),
        }
    }
}

/// First wait before retrying a forced submission that failed to store.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Longest wait between retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Timer callback: submits the attempt with `Timeout`, retrying storage
/// failures with backoff until the result is recorded. Holds only a weak
/// reference so pending timers do not keep the manager alive.
async fn expire(inner: Weak<Inner>, session_id: Uuid, student_id: i64) {
    let mut delay = RETRY_DELAY;
    let mut retry_count = 0u32;

    loop {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let manager = SessionManager { inner };

        match manager
            .submit(session_id, student_id, SubmitTrigger::Timeout)
            .await
        {
            Ok(outcome) if outcome.duplicate => {
                tracing::debug!(%session_id, "Deadline reached after submission, nothing to do");
                return;
            }
            Ok(outcome) => {
                tracing::info!(
                    %session_id,
                    score = outcome.result.score,
                    retries = retry_count,
                    "Attempt force-submitted at deadline"
                );
                return;
            }
            Err(ExamError::NotFound(_)) => {
                tracing::debug!(%session_id, "Deadline reached for a discarded attempt");
                return;
            }
            Err(e) if e.is_permanent() => {
                tracing::error!(%session_id, "Forced submission failed: {}", e);
                return;
            }
            Err(e) => {
                retry_count += 1;
                tracing::warn!(
                    %session_id,
                    "Forced submission not stored, retrying in {:?}... (Attempt {}): {}",
                    delay,
                    retry_count,
                    e
                );
            }
        }

        // Release the manager while waiting.
        drop(manager);
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(MAX_RETRY_DELAY);
    }
}
