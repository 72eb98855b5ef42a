use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::exams::helpers::{load_exam, load_managed_exam};
use crate::api::guards::{require_student, CurrentTeacher, CurrentUser};
use crate::api::validation::validate_payload;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Participant, User};
use crate::db::types::{ExamStatus, UserRole};
use crate::repositories;
use crate::schemas::participant::{
    AccessResponse, InviteRequest, InviteResponse, JoinRequest, ParticipantListItem,
    ParticipantListQuery, ParticipantResponse,
};
use crate::services::attempts::attempts_remaining;
use crate::services::exam_access::{evaluate_access, AccessDecision};
use crate::services::exam_lifecycle::{phase, status_label, LifecycleError};
use crate::services::join_codes::join_code_matches;
use crate::services::participation::{next_status, normalize_usernames, ParticipantAction};

pub(super) async fn list_participants(
    Path(exam_id): Path<String>,
    Query(params): Query<ParticipantListQuery>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
) -> Result<Json<Vec<ParticipantListItem>>, ApiError> {
    let exam = load_managed_exam(state.db(), &teacher, &exam_id).await?;

    let rows = repositories::participants::list_by_exam(state.db(), &exam.id, params.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list participants"))?;

    Ok(Json(rows.into_iter().map(ParticipantListItem::from_row).collect()))
}

/// Invites students by username. Existing participants keep their status; names that
/// do not belong to an active student are reported back as unknown.
pub(super) async fn invite_participants(
    Path(exam_id): Path<String>,
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    validate_payload(&payload)?;

    let exam = load_managed_exam(state.db(), &teacher, &exam_id).await?;
    if matches!(exam.status, ExamStatus::Closed | ExamStatus::Graded) {
        return Err(LifecycleError::InvalidTransition {
            action: "invite to",
            from: status_label(exam.status),
        }
        .into());
    }

    let usernames = normalize_usernames(&payload.usernames);
    let users = repositories::users::list_by_usernames(state.db(), &usernames)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve usernames"))?;
    let students: Vec<User> =
        users.into_iter().filter(|user| user.role == UserRole::Student).collect();

    let user_ids: Vec<String> = students.iter().map(|user| user.id.clone()).collect();
    let invited_ids: HashSet<String> = repositories::participants::invite_many(
        state.db(),
        &exam.id,
        &user_ids,
        &teacher.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to invite participants"))?
    .into_iter()
    .collect();

    let mut response = InviteResponse::default();
    for username in &usernames {
        match students.iter().find(|user| &user.username == username) {
            Some(user) if invited_ids.contains(&user.id) => response.invited.push(username.clone()),
            Some(_) => response.already_participating.push(username.clone()),
            None => response.unknown.push(username.clone()),
        }
    }

    tracing::info!(
        exam_id = %exam.id,
        invited = response.invited.len(),
        already_participating = response.already_participating.len(),
        unknown = response.unknown.len(),
        "Participants invited"
    );

    Ok(Json(response))
}

pub(super) async fn join_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    payload: Option<Json<JoinRequest>>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    require_student(&user)?;
    let exam = load_visible_exam(&state, &exam_id).await?;
    if exam.status != ExamStatus::Published {
        return Err(ApiError::BadRequest("Exam is not open for joining".to_string()));
    }

    if let Some(stored_hash) = exam.join_code_hash.as_deref() {
        let code = payload.and_then(|Json(body)| body.join_code).unwrap_or_default();
        if !join_code_matches(&code, stored_hash) {
            return Err(ApiError::Forbidden("Invalid join code"));
        }
    }

    let participant = apply_action(&state, &exam, &user, ParticipantAction::Join).await?;
    Ok(Json(ParticipantResponse::from_db(participant)))
}

pub(super) async fn accept_invitation(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    require_student(&user)?;
    let exam = load_visible_exam(&state, &exam_id).await?;
    let participant = apply_action(&state, &exam, &user, ParticipantAction::Accept).await?;
    Ok(Json(ParticipantResponse::from_db(participant)))
}

pub(super) async fn decline_invitation(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    require_student(&user)?;
    let exam = load_visible_exam(&state, &exam_id).await?;
    let participant = apply_action(&state, &exam, &user, ParticipantAction::Decline).await?;
    Ok(Json(ParticipantResponse::from_db(participant)))
}

/// Tells a student whether they may take the exam now and where to go otherwise.
/// Unknown exams answer `not_published` rather than 404.
pub(super) async fn check_access(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AccessResponse>, ApiError> {
    require_student(&user)?;

    let exam = repositories::exams::find_by_id(state.db(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;
    let Some(exam) = exam else {
        let decision = AccessDecision::NotPublished;
        return Ok(Json(AccessResponse {
            exam_id,
            decision,
            allowed: false,
            redirect: decision.redirect(),
            message: decision.message(),
            phase: None,
            participant_status: None,
            attempts_used: 0,
            attempts_remaining: None,
        }));
    };

    let participant = repositories::participants::find(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch participant"))?;
    let attempts_used = repositories::submissions::count_attempts(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;

    let now = primitive_now_utc();
    let decision = evaluate_access(&exam, participant.as_ref(), attempts_used, now);

    Ok(Json(AccessResponse {
        exam_id: exam.id.clone(),
        decision,
        allowed: decision.is_allowed(),
        redirect: decision.redirect(),
        message: decision.message(),
        phase: Some(phase(exam.status, exam.start_time, exam.end_time, now)),
        participant_status: participant.map(|participant| participant.status),
        attempts_used,
        attempts_remaining: attempts_remaining(exam.max_attempts, attempts_used),
    }))
}

/// Drafts are invisible to students.
async fn load_visible_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    let exam = load_exam(state.db(), exam_id).await?;
    if exam.status == ExamStatus::Draft {
        return Err(ApiError::NotFound("Exam not found".to_string()));
    }
    Ok(exam)
}

async fn apply_action(
    state: &AppState,
    exam: &Exam,
    user: &User,
    action: ParticipantAction,
) -> Result<Participant, ApiError> {
    let current = repositories::participants::find(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch participant"))?;
    let target = next_status(action, current.as_ref().map(|participant| participant.status))?;
    let now = primitive_now_utc();

    let participant = match (current, target) {
        (Some(participant), None) => return Ok(participant),
        (None, None) => {
            return Err(ApiError::internal("no participant and no target", "Invalid participant state"))
        }
        (None, Some(status)) => {
            repositories::participants::insert(state.db(), &exam.id, &user.id, status, now)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(db) if db.is_unique_violation() => {
                        ApiError::Conflict("Participation changed concurrently, retry".to_string())
                    }
                    other => ApiError::internal(other, "Failed to create participant"),
                })?
        }
        (Some(participant), Some(status)) => repositories::participants::update_status(
            state.db(),
            &participant.id,
            participant.status,
            status,
            now,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update participant"))?
        .ok_or_else(|| {
            ApiError::Conflict("Participation changed concurrently, retry".to_string())
        })?,
    };

    tracing::info!(
        exam_id = %exam.id,
        user_id = %user.id,
        action = ?action,
        status = ?participant.status,
        "Participant status changed"
    );

    Ok(participant)
}
