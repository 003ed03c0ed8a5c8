// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, exam, result},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (exams, attempts, results, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (stores, session manager, config).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth = || middleware::from_fn_with_state(state.clone(), auth_middleware);

    let exam_routes = Router::new()
        .route("/{exam_id}", get(exam::get_exam))
        // Protected exam routes
        .merge(
            Router::new()
                .route("/{exam_id}/attempts", post(exam::start_attempt))
                .route("/{exam_id}/statistics", get(exam::get_statistics))
                .route_layer(auth()),
        );

    let attempt_routes = Router::new()
        .route("/{session_id}", get(attempt::get_attempt))
        .route("/{session_id}/answers", put(attempt::record_answer))
        .route("/{session_id}/cursor", put(attempt::navigate))
        .route("/{session_id}/submit", post(attempt::submit_attempt))
        .layer(auth());

    let result_routes = Router::new()
        .route("/api/results", get(result::list_my_results))
        // Merged at the root: only matched routes require a token
        .route_layer(auth());

    let admin_routes = Router::new()
        .route("/exams", post(admin::create_exam))
        .route("/exams/{exam_id}/results", get(admin::list_exam_results))
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth());

    Router::new()
        .nest("/api/exams", exam_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes)
        .merge(result_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
