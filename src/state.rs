// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    exam::{Clock, PassPolicy, SessionManager},
    store::{ExamStore, ResultSink},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub exams: Arc<dyn ExamStore>,
    pub results: Arc<dyn ResultSink>,
    pub sessions: SessionManager,
}

impl AppState {
    /// Wires the session manager to the given stores. The pass policy for
    /// exams without a passing score comes from `config`.
    pub fn new(
        config: Config,
        exams: Arc<dyn ExamStore>,
        results: Arc<dyn ResultSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = PassPolicy::from_config(config.default_passing_percentage);
        let sessions = SessionManager::new(exams.clone(), results.clone(), clock, policy);

        Self {
            config,
            exams,
            results,
            sessions,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ExamStore> {
    fn from_ref(state: &AppState) -> Self {
        state.exams.clone()
    }
}

impl FromRef<AppState> for Arc<dyn ResultSink> {
    fn from_ref(state: &AppState) -> Self {
        state.results.clone()
    }
}
