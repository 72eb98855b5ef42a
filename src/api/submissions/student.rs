use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::exams::helpers::{load_exam, load_questions};
use crate::api::guards::{can_manage_exam, require_student, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::submission::{
    MySubmissionItem, MySubmissionsQuery, SubmissionResponse, SubmitRequest,
};
use crate::services::attempts;

pub(super) async fn submit_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    require_student(&user)?;

    let exam = load_exam(state.db(), &exam_id).await?;
    if exam.status == ExamStatus::Draft {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }
    let questions = load_questions(state.db(), &exam.id).await?;

    let submission = attempts::submit_attempt(
        state.db(),
        &exam,
        &questions,
        &user.id,
        payload.answers,
        primitive_now_utc(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(SubmissionResponse::from_db(submission, false))))
}

pub(super) async fn list_my_submissions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<MySubmissionsQuery>,
) -> Result<Json<Vec<MySubmissionItem>>, ApiError> {
    let rows =
        repositories::submissions::list_by_student(state.db(), &user.id, params.exam_id.as_deref())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list submissions"))?;

    Ok(Json(rows.into_iter().map(MySubmissionItem::from_row).collect()))
}

/// Visible to the student who submitted it and to whoever manages the exam.
pub(super) async fn get_submission(
    Path(submission_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = repositories::submissions::find_by_id(state.db(), &submission_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch submission"))?
        .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

    if submission.student_id == user.id {
        return Ok(Json(SubmissionResponse::from_db(submission, false)));
    }

    let exam = load_exam(state.db(), &submission.exam_id).await?;
    if !can_manage_exam(&user, &exam.created_by) {
        return Err(ApiError::NotFound("Submission not found".to_string()));
    }

    Ok(Json(SubmissionResponse::from_db(submission, true)))
}
