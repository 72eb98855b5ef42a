use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::{can_manage_exam, is_staff, CurrentTeacher, CurrentUser};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::types::{ExamStatus, ParticipantStatus};
use crate::repositories;
use crate::schemas::exam::{DeleteExamQuery, ExamResponse, ExamUpdate};
use crate::services::exam_lifecycle::{check_window, phase, status_label, ExamPhase, LifecycleError};
use crate::services::join_codes::{generate_join_code, hash_join_code};

use super::super::helpers;

/// Owners see grading keys. Students only see questions once the exam has started and
/// they are an accepted participant.
pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ExamResponse>, ApiError> {
    let exam = helpers::load_exam(state.db(), &exam_id).await?;

    if can_manage_exam(&user, &exam.created_by) {
        let questions = helpers::load_questions(state.db(), &exam.id).await?;
        return Ok(Json(helpers::exam_to_response(exam, questions, true, None)));
    }
    if is_staff(&user) {
        return Err(ApiError::Forbidden("You can only view your own exams"));
    }
    if exam.status == ExamStatus::Draft {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }

    let participant = repositories::participants::find(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch participant"))?;
    let joined = participant.is_some_and(|participant| {
        matches!(participant.status, ParticipantStatus::Accepted | ParticipantStatus::Completed)
    });
    let started = !matches!(
        phase(exam.status, exam.start_time, exam.end_time, primitive_now_utc()),
        ExamPhase::Draft | ExamPhase::Scheduled
    );

    let questions = if joined && started {
        helpers::load_questions(state.db(), &exam.id).await?
    } else {
        Vec::new()
    };

    Ok(Json(helpers::exam_to_response(exam, questions, false, None)))
}

pub(in crate::api::exams) async fn update_exam(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ExamResponse>, ApiError> {
    validate_payload(&payload)?;

    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;
    if matches!(exam.status, ExamStatus::Closed | ExamStatus::Graded) {
        return Err(LifecycleError::InvalidTransition {
            action: "edit",
            from: status_label(exam.status),
        }
        .into());
    }

    if let Some(Some(max_attempts)) = payload.max_attempts {
        if max_attempts < 1 {
            return Err(ApiError::BadRequest("max_attempts must be positive".to_string()));
        }
    }

    let start_time = payload.start_time.map(to_primitive_utc);
    let end_time = payload.end_time.map(to_primitive_utc);
    check_window(start_time.unwrap_or(exam.start_time), end_time.unwrap_or(exam.end_time))?;

    let join_code = match payload.require_join_code {
        Some(true) => Some(generate_join_code()),
        _ => None,
    };
    let join_code_hash = match payload.require_join_code {
        Some(true) => join_code.as_deref().map(|code| Some(hash_join_code(code))),
        Some(false) => Some(None),
        None => None,
    };

    let updated = repositories::exams::update(
        state.db(),
        &exam.id,
        repositories::exams::UpdateExam {
            title: payload.title.map(|title| title.trim().to_string()),
            description: payload.description,
            start_time,
            end_time,
            max_attempts: payload.max_attempts,
            join_code_hash,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    tracing::info!(exam_id = %updated.id, teacher_id = %teacher.id, "Exam updated");

    let questions = helpers::load_questions(state.db(), &updated.id).await?;
    Ok(Json(helpers::exam_to_response(updated, questions, true, join_code)))
}

pub(in crate::api::exams) async fn delete_exam(
    Path(exam_id): Path<String>,
    Query(params): Query<DeleteExamQuery>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;

    let submissions = repositories::submissions::count_for_exam(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count submissions"))?;
    if submissions > 0 && !params.force {
        return Err(ApiError::Conflict(format!(
            "Exam has {submissions} submission(s); pass force=true to delete it anyway"
        )));
    }

    repositories::exams::delete_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    tracing::info!(exam_id = %exam.id, teacher_id = %teacher.id, submissions, "Exam deleted");

    Ok(StatusCode::NO_CONTENT)
}
