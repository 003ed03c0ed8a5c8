//! Errors raised by the exam engine.

use thiserror::Error;

use super::session::SessionStatus;

/// Everything that can go wrong while running an attempt.
#[derive(Debug, Error)]
pub enum ExamError {
    /// Unknown exam or session.
    #[error("{0} not found")]
    NotFound(String),

    /// The exam exists but is flagged unavailable.
    #[error("exam {0} is not active")]
    InactiveExam(i64),

    /// The operation is not legal in the session's current state.
    #[error("cannot {operation} while the attempt is {status}")]
    InvalidState {
        status: SessionStatus,
        operation: &'static str,
    },

    /// The exam definition breaks its own invariants. Grading cannot proceed.
    #[error("malformed exam: {0}")]
    MalformedExam(String),

    /// Caller input is out of range or has the wrong shape.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A storage adapter failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl ExamError {
    /// Returns `true` if retrying the same call cannot succeed.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, ExamError::Storage(_))
    }
}

impl From<sqlx::Error> for ExamError {
    fn from(err: sqlx::Error) -> Self {
        ExamError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ExamError {
    fn from(err: serde_json::Error) -> Self {
        ExamError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_retryable() {
        assert!(ExamError::NotFound("exam 1".into()).is_permanent());
        assert!(ExamError::MalformedExam("no points".into()).is_permanent());
        assert!(!ExamError::Storage("connection reset".into()).is_permanent());
    }

    #[test]
    fn test_json_errors_become_storage_errors() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(ExamError::from(err), ExamError::Storage(_)));
    }
}
