//! Per-attempt countdown.
//!
//! The timer only triggers the forced submission. Whether that submission
//! still applies is decided by the session's state, so a timer that fires
//! after a manual submit is harmless.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct DeadlineManager {
    deadline: DateTime<Utc>,
    timer: Option<JoinHandle<()>>,
}

impl DeadlineManager {
    pub fn new(deadline: DateTime<Utc>) -> Self {
        Self {
            deadline,
            timer: None,
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// `max(0, deadline - now)`, recomputed on every call.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline - now).max(Duration::zero())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }

    /// Schedules `on_expiry` to run once the deadline is reached. Replaces any
    /// previously armed timer. Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, now: DateTime<Utc>, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let wait = self.remaining(now).to_std().unwrap_or_default();

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            // Detached so that cancelling the timer from inside the expiry
            // path cannot abort the submission it started.
            tokio::spawn(on_expiry);
        }));
    }

    pub fn is_armed(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops a pending timer, if any.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for DeadlineManager {
    fn drop(&mut self) {
        self.cancel();
    }
}
