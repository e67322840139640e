use arbiter_engine::grader::{MAX_INPUT_BYTES, MAX_SOURCE_BYTES};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

/// Largest JSON body accepted. Leaves room for escaping and several
/// full-size test inputs; per-field caps are enforced by the judge.
pub const MAX_BODY_BYTES: usize = MAX_SOURCE_BYTES + 4 * MAX_INPUT_BYTES;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/run", post(handlers::run_code))
        .route("/submit/:problem_id", post(handlers::submit_code))
        .route("/submissions/:problem_id", get(handlers::list_submissions))
        .route("/solved", get(handlers::list_solved))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
