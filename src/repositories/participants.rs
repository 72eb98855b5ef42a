use sqlx::{PgPool, Postgres, Transaction};
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::Participant;
use crate::db::types::ParticipantStatus;

const COLUMNS: &str = "id, exam_id, user_id, status, invited_by, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ParticipantRow {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) username: String,
    pub(crate) full_name: String,
    pub(crate) status: ParticipantStatus,
    pub(crate) invited_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn find(
    pool: &PgPool,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(&format!(
        "SELECT {COLUMNS} FROM participants WHERE exam_id = $1 AND user_id = $2"
    ))
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<ParticipantStatus>,
) -> Result<Vec<ParticipantRow>, sqlx::Error> {
    sqlx::query_as::<_, ParticipantRow>(
        "SELECT p.id, p.user_id, u.username, u.full_name, p.status, p.invited_by,
                p.created_at, p.updated_at
         FROM participants p
         JOIN users u ON u.id = p.user_id
         WHERE p.exam_id = $1
           AND ($2::participantstatus IS NULL OR p.status = $2)
         ORDER BY u.username",
    )
    .bind(exam_id)
    .bind(status)
    .fetch_all(pool)
    .await
}

/// Inserts `invited` rows for the given users. Existing rows are left as they are;
/// returns the ids of users that were newly invited.
pub(crate) async fn invite_many(
    pool: &PgPool,
    exam_id: &str,
    user_ids: &[String],
    invited_by: &str,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = user_ids.iter().map(|_| Uuid::new_v4().to_string()).collect();

    sqlx::query_scalar::<_, String>(
        "INSERT INTO participants (id, exam_id, user_id, status, invited_by, created_at, updated_at)
         SELECT new_id, $2, user_id, $4, $5, $6, $6
         FROM UNNEST($1::varchar[], $3::varchar[]) AS t(new_id, user_id)
         ON CONFLICT (exam_id, user_id) DO NOTHING
         RETURNING user_id",
    )
    .bind(&ids)
    .bind(exam_id)
    .bind(user_ids)
    .bind(ParticipantStatus::Invited)
    .bind(invited_by)
    .bind(now)
    .fetch_all(pool)
    .await
}

pub(crate) async fn insert(
    pool: &PgPool,
    exam_id: &str,
    user_id: &str,
    status: ParticipantStatus,
    now: PrimitiveDateTime,
) -> Result<Participant, sqlx::Error> {
    sqlx::query_as::<_, Participant>(&format!(
        "INSERT INTO participants (id, exam_id, user_id, status, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$5,$5)
         RETURNING {COLUMNS}"
    ))
    .bind(Uuid::new_v4().to_string())
    .bind(exam_id)
    .bind(user_id)
    .bind(status)
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Compare-and-set on the participant status; `None` when the row moved underneath us.
pub(crate) async fn update_status(
    pool: &PgPool,
    id: &str,
    from: ParticipantStatus,
    to: ParticipantStatus,
    now: PrimitiveDateTime,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(&format!(
        "UPDATE participants SET status = $1, updated_at = $2
         WHERE id = $3 AND status = $4
         RETURNING {COLUMNS}"
    ))
    .bind(to)
    .bind(now)
    .bind(id)
    .bind(from)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn lock_for_submit(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    user_id: &str,
) -> Result<Option<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(&format!(
        "SELECT {COLUMNS} FROM participants WHERE exam_id = $1 AND user_id = $2 FOR UPDATE"
    ))
    .bind(exam_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
}

pub(crate) async fn mark_completed(
    tx: &mut Transaction<'_, Postgres>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE participants SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(ParticipantStatus::Completed)
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
