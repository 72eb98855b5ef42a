use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Participant;
use crate::db::types::ParticipantStatus;
use crate::repositories::participants::ParticipantRow;
use crate::services::exam_access::{AccessDecision, Redirect};
use crate::services::exam_lifecycle::ExamPhase;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct InviteRequest {
    #[validate(length(min = 1, max = 500, message = "usernames must contain 1-500 entries"))]
    pub(crate) usernames: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct InviteResponse {
    pub(crate) invited: Vec<String>,
    pub(crate) already_participating: Vec<String>,
    pub(crate) unknown: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct JoinRequest {
    #[serde(default, alias = "joinCode")]
    pub(crate) join_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ParticipantListQuery {
    #[serde(default)]
    pub(crate) status: Option<ParticipantStatus>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ParticipantResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) user_id: String,
    pub(crate) status: ParticipantStatus,
    pub(crate) updated_at: String,
}

impl ParticipantResponse {
    pub(crate) fn from_db(participant: Participant) -> Self {
        Self {
            id: participant.id,
            exam_id: participant.exam_id,
            user_id: participant.user_id,
            status: participant.status,
            updated_at: format_primitive(participant.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ParticipantListItem {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) status: ParticipantStatus,
    pub(crate) invited_by: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl ParticipantListItem {
    pub(crate) fn from_row(row: ParticipantRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            full_name: row.full_name,
            status: row.status,
            invited_by: row.invited_by,
            created_at: format_primitive(row.created_at),
            updated_at: format_primitive(row.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessResponse {
    pub(crate) exam_id: String,
    pub(crate) decision: AccessDecision,
    pub(crate) allowed: bool,
    pub(crate) redirect: Redirect,
    pub(crate) message: &'static str,
    /// `None` when the exam does not exist.
    pub(crate) phase: Option<ExamPhase>,
    pub(crate) participant_status: Option<ParticipantStatus>,
    pub(crate) attempts_used: i64,
    pub(crate) attempts_remaining: Option<i64>,
}
