use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::guards::can_manage_exam;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Exam, Question, User};
use crate::db::types::ExamKind;
use crate::repositories;
use crate::schemas::exam::{ExamResponse, QuestionCreate, QuestionResponse};
use crate::services::attempts::max_score;
use crate::services::exam_lifecycle::{check_question_shape, phase};

pub(crate) async fn load_exam(pool: &PgPool, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(pool, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

/// Loads an exam the caller is allowed to manage. Other teachers get 403.
pub(crate) async fn load_managed_exam(
    pool: &PgPool,
    user: &User,
    exam_id: &str,
) -> Result<Exam, ApiError> {
    let exam = load_exam(pool, exam_id).await?;
    if !can_manage_exam(user, &exam.created_by) {
        return Err(ApiError::Forbidden("You can only manage your own exams"));
    }
    Ok(exam)
}

pub(crate) async fn load_questions(pool: &PgPool, exam_id: &str) -> Result<Vec<Question>, ApiError> {
    repositories::questions::list_by_exam(pool, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch questions"))
}

/// Rejects question payloads that can never be published for this exam kind.
pub(super) fn check_questions(
    kind: ExamKind,
    first_index: usize,
    questions: &[QuestionCreate],
) -> Result<(), ApiError> {
    for (offset, question) in questions.iter().enumerate() {
        check_question_shape(
            kind,
            first_index + offset + 1,
            question.options.as_deref(),
            question.correct_option,
            question.language.as_deref(),
        )?;
    }
    Ok(())
}

pub(super) async fn insert_questions(
    tx: &mut Transaction<'_, Postgres>,
    exam_id: &str,
    questions: &[QuestionCreate],
) -> Result<Vec<Question>, ApiError> {
    let now = primitive_now_utc();
    let mut order_index = repositories::questions::next_order_index(tx, exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to compute question order"))?;

    let mut created = Vec::with_capacity(questions.len());
    for question in questions {
        let row = repositories::questions::create(
            tx,
            repositories::questions::CreateQuestion {
                id: &Uuid::new_v4().to_string(),
                exam_id,
                order_index,
                text: question.text.trim(),
                max_points: question.max_points,
                options: question.options.as_deref(),
                correct_option: question.correct_option,
                language: question.language.as_deref(),
                reference_solution: question.reference_solution.as_deref(),
                expected_output: question.expected_output.as_deref(),
                now,
            },
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create question"))?;
        created.push(row);
        order_index += 1;
    }

    Ok(created)
}

pub(crate) fn exam_to_response(
    exam: Exam,
    questions: Vec<Question>,
    with_answers: bool,
    join_code: Option<String>,
) -> ExamResponse {
    let exam_phase = phase(exam.status, exam.start_time, exam.end_time, primitive_now_utc());
    let total = max_score(&questions);

    ExamResponse {
        id: exam.id,
        title: exam.title,
        description: exam.description,
        kind: exam.kind,
        status: exam.status,
        phase: exam_phase,
        start_time: format_primitive(exam.start_time),
        end_time: format_primitive(exam.end_time),
        max_attempts: exam.max_attempts,
        requires_join_code: exam.join_code_hash.is_some(),
        join_code,
        max_score: total,
        created_by: exam.created_by,
        created_at: format_primitive(exam.created_at),
        updated_at: format_primitive(exam.updated_at),
        published_at: exam.published_at.map(format_primitive),
        closed_at: exam.closed_at.map(format_primitive),
        questions: questions
            .into_iter()
            .map(|question| QuestionResponse::from_db(question, with_answers))
            .collect(),
    }
}
