use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::types::ExamStatus;
use crate::repositories;
use crate::schemas::exam::{ExamCreate, ExamResponse, QuestionsAppend};
use crate::services::exam_lifecycle::{check_window, LifecycleError};
use crate::services::join_codes::{generate_join_code, hash_join_code};

use super::super::helpers;

pub(in crate::api::exams) async fn create_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_payload(&payload)?;

    let start_time = to_primitive_utc(payload.start_time);
    let end_time = to_primitive_utc(payload.end_time);
    check_window(start_time, end_time)?;
    helpers::check_questions(payload.kind, 0, &payload.questions)?;

    let join_code = payload.require_join_code.then(generate_join_code);
    let join_code_hash = join_code.as_deref().map(hash_join_code);

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let exam_id = Uuid::new_v4().to_string();
    let exam = repositories::exams::create(
        &mut tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: payload.title.trim(),
            description: payload.description.as_deref(),
            kind: payload.kind,
            start_time,
            end_time,
            max_attempts: payload.max_attempts,
            join_code_hash: join_code_hash.as_deref(),
            created_by: &teacher.id,
            now: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    let questions = helpers::insert_questions(&mut tx, &exam.id, &payload.questions).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(
        exam_id = %exam.id,
        teacher_id = %teacher.id,
        kind = exam.kind.as_str(),
        questions = questions.len(),
        "Exam created"
    );

    Ok((StatusCode::CREATED, Json(helpers::exam_to_response(exam, questions, true, join_code))))
}

pub(in crate::api::exams) async fn add_questions(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<QuestionsAppend>,
) -> Result<(StatusCode, Json<ExamResponse>), ApiError> {
    validate_payload(&payload)?;

    let exam = helpers::load_managed_exam(state.db(), &teacher, &exam_id).await?;
    if exam.status != ExamStatus::Draft {
        return Err(LifecycleError::NotDraft.into());
    }

    let existing = helpers::load_questions(state.db(), &exam.id).await?;
    helpers::check_questions(exam.kind, existing.len(), &payload.questions)?;

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;
    let added = helpers::insert_questions(&mut tx, &exam.id, &payload.questions).await?;
    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    tracing::info!(exam_id = %exam.id, added = added.len(), "Questions added");

    let mut questions = existing;
    questions.extend(added);
    Ok((StatusCode::CREATED, Json(helpers::exam_to_response(exam, questions, true, None))))
}
