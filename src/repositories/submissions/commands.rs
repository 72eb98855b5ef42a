use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use time::PrimitiveDateTime;

use crate::db::models::Submission;
use crate::db::types::{ExamKind, GraderKind, SubmissionStatus};

use super::queries::latest_attempt;
use super::types::{CreateSubmission, GradeUpdate, COLUMNS};

/// Serializes attempt allocation for one (exam, student) pair for the rest of the
/// transaction and returns the number the next attempt should use.
pub(crate) async fn lock_attempts(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    student_id: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
        .bind(exam_id)
        .bind(student_id)
        .execute(&mut **tx)
        .await?;

    Ok(latest_attempt(tx, exam_id, student_id).await?.unwrap_or(0) + 1)
}

pub(crate) async fn insert(
    tx: &mut Transaction<'_, Postgres>,
    params: CreateSubmission<'_>,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO submissions (
            id, exam_id, student_id, attempt_number, answers, status, max_score,
            submitted_at, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$8,$8)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.attempt_number)
    .bind(Json(params.answers))
    .bind(SubmissionStatus::Pending)
    .bind(params.max_score)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await
}

/// Stores a grading result. Revised submissions are never overwritten; returns `None`
/// when the row was revised in the meantime.
pub(crate) async fn record_grade<'e, E>(
    executor: E,
    id: &str,
    update: GradeUpdate,
) -> Result<Option<Submission>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1,
             score = $2,
             feedback = $3,
             question_results = $4,
             grader = $5,
             grading_error = NULL,
             grading_started_at = NULL,
             graded_at = $6,
             updated_at = $6
         WHERE id = $7 AND status <> $8
         RETURNING {COLUMNS}"
    ))
    .bind(SubmissionStatus::Corrected)
    .bind(update.score)
    .bind(update.feedback)
    .bind(Json(update.question_results))
    .bind(update.grader)
    .bind(update.graded_at)
    .bind(id)
    .bind(SubmissionStatus::Revised)
    .fetch_optional(executor)
    .await
}

/// Claims the oldest pending submission that still has grading attempts left and is not
/// being graded by another worker. Bumps the attempt counter as part of the claim.
/// Submissions to code exams are left alone unless `sandbox_ready` is set.
pub(crate) async fn claim_next_pending(
    pool: &PgPool,
    max_attempts: i32,
    sandbox_ready: bool,
    now: PrimitiveDateTime,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "WITH candidate AS (
            SELECT id
            FROM submissions
            WHERE status = $1
              AND grading_started_at IS NULL
              AND grading_attempts < $2
              AND ($4 OR exam_id NOT IN (SELECT id FROM exams WHERE kind = $5))
            ORDER BY grading_attempts, submitted_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE submissions
        SET grading_started_at = $3,
            grading_attempts = submissions.grading_attempts + 1,
            updated_at = $3
        FROM candidate
        WHERE submissions.id = candidate.id
        RETURNING submissions.id",
    )
    .bind(SubmissionStatus::Pending)
    .bind(max_attempts)
    .bind(now)
    .bind(sandbox_ready)
    .bind(ExamKind::Code)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn record_failure(
    pool: &PgPool,
    id: &str,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE submissions
         SET grading_error = $1,
             grading_started_at = NULL,
             updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(SubmissionStatus::Pending)
    .execute(pool)
    .await?;
    Ok(())
}

/// Frees claims left behind by a worker that died mid-grading.
pub(crate) async fn release_stale(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE submissions
         SET grading_started_at = NULL,
             grading_error = COALESCE(grading_error, 'grading timed out'),
             updated_at = $1
         WHERE status = $2
           AND grading_started_at IS NOT NULL
           AND grading_started_at < $3",
    )
    .bind(now)
    .bind(SubmissionStatus::Pending)
    .bind(started_before)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn revise(
    pool: &PgPool,
    id: &str,
    score: f64,
    feedback: Option<&str>,
    reviewer_id: &str,
    now: PrimitiveDateTime,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "UPDATE submissions
         SET status = $1,
             score = $2,
             feedback = COALESCE($3, feedback),
             grader = $4,
             grading_started_at = NULL,
             reviewed_by = $5,
             reviewed_at = $6,
             updated_at = $6
         WHERE id = $7
         RETURNING {COLUMNS}"
    ))
    .bind(SubmissionStatus::Revised)
    .bind(score)
    .bind(feedback)
    .bind(GraderKind::Teacher)
    .bind(reviewer_id)
    .bind(now)
    .bind(id)
    .fetch_one(pool)
    .await
}
