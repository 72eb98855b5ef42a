use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use time::PrimitiveDateTime;

use crate::db::models::Question;

const COLUMNS: &str = "\
    id, exam_id, order_index, text, max_points, options, correct_option, language, \
    reference_solution, expected_output, created_at, updated_at";

pub(crate) async fn list_by_exam(pool: &PgPool, exam_id: &str) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "SELECT {COLUMNS} FROM questions WHERE exam_id = $1 ORDER BY order_index, created_at"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn next_order_index(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "SELECT COALESCE(MAX(order_index) + 1, 0) FROM questions WHERE exam_id = $1",
    )
    .bind(exam_id)
    .fetch_one(&mut **tx)
    .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) order_index: i32,
    pub(crate) text: &'a str,
    pub(crate) max_points: f64,
    pub(crate) options: Option<&'a [String]>,
    pub(crate) correct_option: Option<i32>,
    pub(crate) language: Option<&'a str>,
    pub(crate) reference_solution: Option<&'a str>,
    pub(crate) expected_output: Option<&'a str>,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) async fn create(
    tx: &mut Transaction<'_, Postgres>,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, exam_id, order_index, text, max_points, options, correct_option, language,
            reference_solution, expected_output, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$11)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.order_index)
    .bind(params.text)
    .bind(params.max_points)
    .bind(params.options.map(Json))
    .bind(params.correct_option)
    .bind(params.language)
    .bind(params.reference_solution)
    .bind(params.expected_output)
    .bind(params.now)
    .fetch_one(&mut **tx)
    .await
}
