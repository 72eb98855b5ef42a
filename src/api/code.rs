use axum::{extract::State, routing::post, Json, Router};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::schemas::code::RunCodeRequest;
use crate::services::code_runner::language_id;
use crate::services::grading::{ExecutionReport, ExecutionRequest};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/run", post(run_code))
}

/// Runs a snippet in the sandbox so students can try a solution before submitting.
async fn run_code(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<RunCodeRequest>,
) -> Result<Json<ExecutionReport>, ApiError> {
    validate_payload(&payload)?;

    let sandbox = state.settings().sandbox();
    if !sandbox.is_configured() {
        return Err(ApiError::ServiceUnavailable("Code sandbox is not configured".to_string()));
    }
    if language_id(&payload.language).is_none() {
        return Err(ApiError::BadRequest(format!("Unsupported language '{}'", payload.language)));
    }

    let rate_key = format!("rl:code-run:{}", user.id);
    if !state.redis().allow(&rate_key, sandbox.run_rate_limit, sandbox.run_rate_window_seconds).await
    {
        return Err(ApiError::TooManyRequests("Too many code runs, try again later"));
    }

    let report = state
        .graders()
        .executor
        .execute(ExecutionRequest {
            source_code: payload.source_code,
            language: payload.language.trim().to_string(),
            stdin: payload.stdin,
            expected_output: None,
        })
        .await
        .map_err(|e| {
            tracing::warn!(user_id = %user.id, error = %e, "Code run failed");
            ApiError::ServiceUnavailable("Code sandbox request failed".to_string())
        })?;

    metrics::counter!("code_runs_total", "status" => report.status.clone()).increment(1);

    Ok(Json(report))
}
