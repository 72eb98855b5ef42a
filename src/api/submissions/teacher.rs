use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::exams::helpers::load_managed_exam;
use crate::api::guards::CurrentTeacher;
use crate::api::pagination::PaginatedResponse;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Submission, User};
use crate::db::types::ExamKind;
use crate::repositories;
use crate::schemas::submission::{
    ExamSubmissionItem, ExamSubmissionsQuery, ReviseRequest, SubmissionResponse,
};
use crate::services::grading::grade_and_record;

pub(super) async fn list_exam_submissions(
    Path(exam_id): Path<String>,
    Query(params): Query<ExamSubmissionsQuery>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<PaginatedResponse<ExamSubmissionItem>>, ApiError> {
    let exam = load_managed_exam(state.db(), &teacher, &exam_id).await?;

    let rows = repositories::submissions::list_by_exam(
        state.db(),
        &exam.id,
        params.status,
        params.skip,
        params.limit,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;
    let total_count = repositories::submissions::count_by_exam(state.db(), &exam.id, params.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count submissions"))?;

    let items = rows.into_iter().map(ExamSubmissionItem::from_row).collect();
    Ok(Json(PaginatedResponse::new(items, total_count, params.skip, params.limit)))
}

/// Grades (or re-grades) a submission synchronously.
pub(super) async fn grade_submission(
    Path(submission_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let (submission, exam) = load_managed_submission(&state, &teacher, &submission_id).await?;
    ensure_graders_configured(&state, exam.kind)?;

    let graded = grade_and_record(state.db(), state.graders(), &submission.id).await?;

    tracing::info!(
        submission_id = %graded.id,
        teacher_id = %teacher.id,
        score = graded.score,
        "Submission graded on request"
    );

    Ok(Json(SubmissionResponse::from_db(graded, true)))
}

pub(super) async fn revise_submission(
    Path(submission_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ReviseRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    validate_payload(&payload)?;

    let (submission, _exam) = load_managed_submission(&state, &teacher, &submission_id).await?;
    if payload.score > submission.max_score {
        return Err(ApiError::BadRequest(format!(
            "score must not exceed the maximum of {}",
            submission.max_score
        )));
    }

    let revised = repositories::submissions::revise(
        state.db(),
        &submission.id,
        payload.score,
        payload.feedback.as_deref(),
        &teacher.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to revise submission"))?;

    tracing::info!(
        submission_id = %revised.id,
        teacher_id = %teacher.id,
        score = payload.score,
        previous_score = submission.score,
        "Submission revised"
    );

    Ok(Json(SubmissionResponse::from_db(revised, true)))
}

async fn load_managed_submission(
    state: &AppState,
    teacher: &User,
    submission_id: &str,
) -> Result<(Submission, Exam), ApiError> {
    let submission = repositories::submissions::find_by_id(state.db(), submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;
    let exam = load_managed_exam(state.db(), teacher, &submission.exam_id).await?;
    Ok((submission, exam))
}

/// Quiz grading is local; code exams need the sandbox and the evaluator, documents
/// only the evaluator.
fn ensure_graders_configured(state: &AppState, kind: ExamKind) -> Result<(), ApiError> {
    let settings = state.settings();
    match kind {
        ExamKind::Quiz => Ok(()),
        ExamKind::Code if !settings.sandbox().is_configured() => {
            Err(ApiError::ServiceUnavailable("Code sandbox is not configured".to_string()))
        }
        ExamKind::Code | ExamKind::Document if !settings.ai().is_configured() => {
            Err(ApiError::ServiceUnavailable("AI evaluation is not configured".to_string()))
        }
        ExamKind::Code | ExamKind::Document => Ok(()),
    }
}
