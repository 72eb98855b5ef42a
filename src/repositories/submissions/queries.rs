use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use crate::db::models::Submission;
use crate::db::types::SubmissionStatus;

use super::types::{ExamSubmissionRow, StudentSubmissionRow, COLUMNS};

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!("SELECT {COLUMNS} FROM submissions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn count_attempts(
    pool: &PgPool,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1 AND student_id = $2")
        .bind(exam_id)
        .bind(student_id)
        .fetch_one(pool)
        .await
}

/// Latest attempt number inside the submit transaction, after the attempt lock is held.
pub(crate) async fn latest_attempt(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar::<_, Option<i32>>(
        "SELECT MAX(attempt_number) FROM submissions WHERE exam_id = $1 AND student_id = $2",
    )
    .bind(exam_id)
    .bind(student_id)
    .fetch_one(&mut **tx)
    .await
}

pub(crate) async fn count_for_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn count_pending_for_exam(pool: &PgPool, exam_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE exam_id = $1 AND status = $2")
        .bind(exam_id)
        .bind(SubmissionStatus::Pending)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
    exam_id: Option<&str>,
) -> Result<Vec<StudentSubmissionRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentSubmissionRow>(
        "SELECT s.id, s.exam_id, e.title AS exam_title, s.attempt_number, s.status,
                s.score, s.max_score, s.submitted_at
         FROM submissions s
         JOIN exams e ON e.id = s.exam_id
         WHERE s.student_id = $1
           AND ($2::varchar IS NULL OR s.exam_id = $2)
         ORDER BY s.submitted_at DESC",
    )
    .bind(student_id)
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<SubmissionStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamSubmissionRow>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT s.id,
                s.student_id,
                u.username AS student_username,
                u.full_name AS student_name,
                s.attempt_number,
                s.status,
                s.score,
                s.max_score,
                s.grading_error,
                s.submitted_at
         FROM submissions s
         JOIN users u ON u.id = s.student_id
         WHERE s.exam_id = ",
    );
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND s.status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY s.submitted_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<ExamSubmissionRow>().fetch_all(pool).await
}

pub(crate) async fn count_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<SubmissionStatus>,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM submissions s WHERE s.exam_id = ");
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND s.status = ");
        builder.push_bind(status);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
