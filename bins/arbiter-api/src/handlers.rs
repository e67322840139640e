// HTTP route handlers for the Arbiter API

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use arbiter_common::store::StoreError;
use arbiter_common::types::{Language, RunReport, RunRequest, SubmissionRecord, SubmitRequest, TestCase, UserRef};
use arbiter_engine::JudgeError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::AuthenticatedUser;
use crate::metrics;
use crate::AppState;

pub const RUN_SUCCESS_MESSAGE: &str = "Successfully executed";
pub const EXECUTION_FAILED_MESSAGE: &str = "Failed to execute code!";
pub const STORE_READ_FAILED_MESSAGE: &str = "Failed to load records";

#[derive(Debug, Deserialize)]
pub struct RunBody {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub language: String,
    pub code: String,
    pub problem: ProblemSnapshot,
}

/// Denormalized problem as sent by the caller. Test case order is authoritative.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSnapshot {
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ApiResponse {
    pub success: bool,
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionsResponse {
    pub problem_id: String,
    pub accepted_count: u64,
    pub submissions: Vec<SubmissionRecord>,
}

/// Non-graded failures, mapped onto HTTP status codes.
///
/// `Internal` keeps its detail for the log; callers only see `public`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    PayloadTooLarge(String),
    Internal { public: &'static str, detail: String },
}

impl From<JudgeError> for ApiError {
    fn from(e: JudgeError) -> Self {
        if e.is_client_error() {
            ApiError::BadRequest(e.to_string())
        } else {
            metrics::INFRA_FAILURES_TOTAL.inc();
            ApiError::Internal {
                public: EXECUTION_FAILED_MESSAGE,
                detail: e.to_string(),
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal {
            public: STORE_READ_FAILED_MESSAGE,
            detail: e.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!(
                "Request body exceeds the {} byte limit",
                crate::routes::MAX_BODY_BYTES
            ))
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, result, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "Bad Request", message),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, "Unauthorized", message),
            ApiError::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large", message),
            ApiError::Internal { public, detail } => {
                error!(error = %detail, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", public.to_string())
            }
        };
        let body = ApiResponse {
            success: false,
            result: result.to_string(),
            message: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

fn parse_language(name: &str) -> Result<Language, ApiError> {
    name.parse::<Language>().map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn record_status<T>(mode: &str, result: &Result<T, ApiError>) {
    let status = match result {
        Ok(_) => "200",
        Err(ApiError::BadRequest(_)) => "400",
        Err(ApiError::Unauthorized(_)) => "401",
        Err(ApiError::PayloadTooLarge(_)) => "413",
        Err(ApiError::Internal { .. }) => "500",
    };
    metrics::REQUESTS_TOTAL.with_label_values(&[mode, status]).inc();
}

/// POST /run - Execute code once against a custom input
pub async fn run_code(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<RunBody>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let _timer = metrics::GRADING_DURATION_SECONDS
        .with_label_values(&["run"])
        .start_timer();
    let result = run_inner(&state, payload).await;
    if let Ok(response) = &result {
        info!(user_id = %user.id, success = response.success, "Run request served");
    }
    record_status("run", &result);
    result.map(Json)
}

async fn run_inner(
    state: &Arc<AppState>,
    payload: Result<Json<RunBody>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(body) = payload?;
    let request = RunRequest {
        language: parse_language(&body.language)?,
        source_code: body.code,
        input: body.input,
    };

    let report = state.judge.spawn_run(request).await?;
    Ok(match report {
        RunReport::Output { stdout } => ApiResponse {
            success: true,
            result: stdout,
            message: Some(RUN_SUCCESS_MESSAGE.to_string()),
        },
        RunReport::Failed { kind, diagnostic } => ApiResponse {
            success: false,
            result: kind.label().to_string(),
            message: Some(diagnostic),
        },
    })
}

/// POST /submit/:problem_id - Grade code against the problem's test cases
pub async fn submit_code(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
    AuthenticatedUser(user): AuthenticatedUser,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<Json<ApiResponse>, ApiError> {
    let _timer = metrics::GRADING_DURATION_SECONDS
        .with_label_values(&["submit"])
        .start_timer();

    let result = submit_inner(&state, problem_id, user, payload).await;

    record_status("submit", &result);
    result.map(Json)
}

async fn submit_inner(
    state: &Arc<AppState>,
    problem_id: String,
    user: UserRef,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(body) = payload?;
    if let Some(snapshot_id) = body.problem.id.as_deref() {
        if snapshot_id != problem_id {
            warn!(path = %problem_id, body = %snapshot_id, "Problem id mismatch");
            return Err(ApiError::BadRequest("Problem id does not match the request path".into()));
        }
    }

    let language = parse_language(&body.language)?;
    let request = SubmitRequest {
        user,
        problem_id,
        language,
        source_code: body.code,
        test_cases: body.problem.test_cases,
    };

    let verdict = state.judge.spawn_submit(request).await?;
    metrics::VERDICTS_TOTAL
        .with_label_values(&[language.as_str(), metrics::verdict_class(&verdict)])
        .inc();

    Ok(ApiResponse {
        success: verdict.is_accepted(),
        result: verdict.label(),
        message: Some(verdict.diagnostic()),
    })
}

/// GET /submissions/:problem_id - Submission history of a problem
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
    _user: AuthenticatedUser,
) -> Result<Json<SubmissionsResponse>, ApiError> {
    let store = state.judge.store();
    let submissions = store.submissions(&problem_id).await?;
    let accepted_count = store.accepted_count(&problem_id).await?;

    Ok(Json(SubmissionsResponse {
        problem_id,
        accepted_count,
        submissions,
    }))
}

/// GET /solved - Problems the caller has solved
pub async fn list_solved(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let solved = state.judge.store().solved_problems(&user.id).await?;
    Ok(Json(serde_json::json!({
        "userId": user.id,
        "solvedProblems": solved,
    })))
}

/// GET /status - Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let languages: Vec<&str> = state
        .judge
        .languages()
        .list_languages()
        .into_iter()
        .map(|l| l.as_str())
        .collect();
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "availableSlots": state.judge.executor().available_slots(),
            "languages": languages,
        })),
    )
}

/// GET /metrics - Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}
