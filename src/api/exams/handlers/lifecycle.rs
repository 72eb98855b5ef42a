use axum::extract::{Path, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::Exam;
use crate::repositories;
use crate::schemas::exam::ExamResponse;
use crate::services::exam_lifecycle::{
    check_finalizable, check_publishable, status_label, ExamTransition, LifecycleError,
};

use super::super::helpers;

pub(in crate::api::exams) async fn publish_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;
    ExamTransition::Publish.check(exam.status)?;

    let questions = helpers::load_questions(state.db(), &exam.id).await?;
    check_publishable(exam.kind, &questions)?;

    let published = apply(&state, &exam, ExamTransition::Publish).await?;
    Ok(Json(helpers::exam_to_response(published, questions, true, None)))
}

pub(in crate::api::exams) async fn close_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;
    let closed = apply(&state, &exam, ExamTransition::Close).await?;

    let questions = helpers::load_questions(state.db(), &closed.id).await?;
    Ok(Json(helpers::exam_to_response(closed, questions, true, None)))
}

pub(in crate::api::exams) async fn finalize_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;
    ExamTransition::Finalize.check(exam.status)?;

    let pending = repositories::submissions::count_pending_for_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count pending submissions"))?;
    check_finalizable(pending)?;

    let graded = apply(&state, &exam, ExamTransition::Finalize).await?;
    let questions = helpers::load_questions(state.db(), &graded.id).await?;
    Ok(Json(helpers::exam_to_response(graded, questions, true, None)))
}

/// Runs the status compare-and-set. A concurrent transition that got there first
/// surfaces as the same 400 a stale status would.
async fn apply(
    state: &AppState,
    exam: &Exam,
    transition: ExamTransition,
) -> Result<Exam, ApiError> {
    let (from, to) = transition.check(exam.status)?;

    let updated =
        repositories::exams::transition(state.db(), &exam.id, from, to, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update exam status"))?;

    let Some(updated) = updated else {
        let current = helpers::load_exam(state.db(), &exam.id).await?;
        return Err(LifecycleError::InvalidTransition {
            action: transition.action(),
            from: status_label(current.status),
        }
        .into());
    };

    tracing::info!(
        exam_id = %updated.id,
        action = transition.action(),
        status = status_label(updated.status),
        "Exam status changed"
    );

    Ok(updated)
}
