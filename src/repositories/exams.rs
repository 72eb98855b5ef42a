use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use time::PrimitiveDateTime;

use crate::db::models::Exam;
use crate::db::types::{ExamKind, ExamStatus, ParticipantStatus};

pub(crate) const COLUMNS: &str = "\
    id, title, description, kind, status, start_time, end_time, max_attempts, \
    join_code_hash, created_by, created_at, updated_at, published_at, closed_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) kind: ExamKind,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) join_code_hash: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    tx: &mut Transaction<'_, Postgres>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, description, kind, status, start_time, end_time, max_attempts,
            join_code_hash, created_by, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.kind)
    .bind(ExamStatus::Draft)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.max_attempts)
    .bind(params.join_code_hash)
    .bind(params.created_by)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await
}

/// Metadata edit. `None` leaves a column untouched; the nested options clear nullable columns.
pub(crate) struct UpdateExam {
    pub(crate) title: Option<String>,
    pub(crate) description: Option<Option<String>>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) max_attempts: Option<Option<i32>>,
    pub(crate) join_code_hash: Option<Option<String>>,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateExam,
) -> Result<Exam, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE exams SET updated_at = ");
    builder.push_bind(params.updated_at);

    if let Some(title) = params.title {
        builder.push(", title = ").push_bind(title);
    }
    if let Some(description) = params.description {
        builder.push(", description = ").push_bind(description);
    }
    if let Some(start_time) = params.start_time {
        builder.push(", start_time = ").push_bind(start_time);
    }
    if let Some(end_time) = params.end_time {
        builder.push(", end_time = ").push_bind(end_time);
    }
    if let Some(max_attempts) = params.max_attempts {
        builder.push(", max_attempts = ").push_bind(max_attempts);
    }
    if let Some(join_code_hash) = params.join_code_hash {
        builder.push(", join_code_hash = ").push_bind(join_code_hash);
    }

    builder.push(" WHERE id = ").push_bind(id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Exam>().fetch_one(pool).await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

/// Moves an exam between two statuses. Returns `None` when the row was not in `from`,
/// which lets concurrent transitions lose cleanly.
pub(crate) async fn transition(
    pool: &PgPool,
    id: &str,
    from: ExamStatus,
    to: ExamStatus,
    now: PrimitiveDateTime,
) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "UPDATE exams
         SET status = $1,
             published_at = CASE WHEN $1 = 'published'::examstatus THEN $2 ELSE published_at END,
             closed_at = CASE WHEN $1 = 'closed'::examstatus THEN $2 ELSE closed_at END,
             updated_at = $2
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

pub(crate) async fn close_expired(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "UPDATE exams
         SET status = $1, closed_at = $2, updated_at = $2
         WHERE status = $3 AND end_time < $2
         RETURNING id",
    )
    .bind(ExamStatus::Closed)
    .bind(now)
    .bind(ExamStatus::Published)
    .fetch_all(pool)
    .await
}

#[derive(Debug, Default)]
pub(crate) struct ExamListFilter {
    pub(crate) status: Option<ExamStatus>,
    pub(crate) kind: Option<ExamKind>,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &ExamListFilter) {
    if let Some(status) = filter.status {
        builder.push(" AND e.status = ").push_bind(status);
    }
    if let Some(kind) = filter.kind {
        builder.push(" AND e.kind = ").push_bind(kind);
    }
}

pub(crate) async fn list_owned(
    pool: &PgPool,
    owner_id: &str,
    filter: &ExamListFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM exams e WHERE e.created_by = ",
        prefixed_columns()
    ));
    builder.push_bind(owner_id);
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY e.start_time DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) async fn count_owned(
    pool: &PgPool,
    owner_id: &str,
    filter: &ExamListFilter,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exams e WHERE e.created_by = ");
    builder.push_bind(owner_id);
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Exams a student can see: ones they participate in (except declined) plus every
/// published exam that is open for self-join.
pub(crate) async fn list_visible_to_student(
    pool: &PgPool,
    student_id: &str,
    filter: &ExamListFilter,
    skip: i64,
    limit: i64,
) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT {} FROM exams e
         LEFT JOIN participants p ON p.exam_id = e.id AND p.user_id = ",
        prefixed_columns()
    ));
    builder.push_bind(student_id);
    builder.push(" WHERE e.status <> ");
    builder.push_bind(ExamStatus::Draft);
    builder.push(" AND (p.id IS NULL OR p.status <> ");
    builder.push_bind(ParticipantStatus::Declined);
    builder.push(")");
    push_filters(&mut builder, filter);
    builder.push(" ORDER BY e.start_time DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) async fn count_visible_to_student(
    pool: &PgPool,
    student_id: &str,
    filter: &ExamListFilter,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) FROM exams e
         LEFT JOIN participants p ON p.exam_id = e.id AND p.user_id = ",
    );
    builder.push_bind(student_id);
    builder.push(" WHERE e.status <> ");
    builder.push_bind(ExamStatus::Draft);
    builder.push(" AND (p.id IS NULL OR p.status <> ");
    builder.push_bind(ParticipantStatus::Declined);
    builder.push(")");
    push_filters(&mut builder, filter);
    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn prefixed_columns() -> String {
    COLUMNS.split(',').map(|column| format!("e.{}", column.trim())).collect::<Vec<_>>().join(", ")
}
