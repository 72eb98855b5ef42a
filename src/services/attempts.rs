use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{Exam, Question, Submission};
use crate::db::types::{GraderKind, ParticipantStatus};
use crate::repositories;
use crate::services::exam_access::{evaluate_access, AccessDecision};
use crate::services::grading::score_multiple_choice;

#[derive(Debug, Error, PartialEq)]
pub(crate) enum AnswerError {
    #[error("Answer refers to unknown question '{0}'")]
    UnknownQuestion(String),
    #[error("Answer to question '{0}' must be an option index")]
    ExpectedOption(String),
    #[error("Answer to question '{0}' selects an option that does not exist")]
    OptionOutOfRange(String),
    #[error("Answer to question '{0}' must be text")]
    ExpectedText(String),
}

#[derive(Debug, Error)]
pub(crate) enum SubmitError {
    #[error("{}", .0.message())]
    Denied(AccessDecision),
    #[error(transparent)]
    Answers(#[from] AnswerError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Checks that every answer targets a question of the exam and has the right shape.
/// Unanswered questions are allowed and score zero.
pub(crate) fn validate_answers(
    questions: &[Question],
    answers: &BTreeMap<String, Value>,
) -> Result<(), AnswerError> {
    for (question_id, answer) in answers {
        let Some(question) = questions.iter().find(|question| &question.id == question_id) else {
            return Err(AnswerError::UnknownQuestion(question_id.clone()));
        };

        if answer.is_null() {
            continue;
        }

        match &question.options {
            Some(options) => {
                let index = answer
                    .as_u64()
                    .ok_or_else(|| AnswerError::ExpectedOption(question_id.clone()))?;
                if index >= options.0.len() as u64 {
                    return Err(AnswerError::OptionOutOfRange(question_id.clone()));
                }
            }
            None => {
                if !answer.is_string() {
                    return Err(AnswerError::ExpectedText(question_id.clone()));
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn max_score(questions: &[Question]) -> f64 {
    questions.iter().map(|question| question.max_points).sum()
}

pub(crate) fn attempts_remaining(max_attempts: Option<i32>, attempts_used: i64) -> Option<i64> {
    max_attempts.map(|max| (i64::from(max) - attempts_used).max(0))
}

/// Records a new attempt. Attempt numbering, the access re-check, the participant
/// update and (for quizzes) the score are committed together.
pub(crate) async fn submit_attempt(
    pool: &PgPool,
    exam: &Exam,
    questions: &[Question],
    student_id: &str,
    answers: BTreeMap<String, Value>,
    now: PrimitiveDateTime,
) -> Result<Submission, SubmitError> {
    validate_answers(questions, &answers)?;

    let mut tx = pool.begin().await?;

    let participant =
        repositories::participants::lock_for_submit(&mut tx, &exam.id, student_id).await?;
    let attempt_number =
        repositories::submissions::lock_attempts(&mut tx, &exam.id, student_id).await?;

    let decision =
        evaluate_access(exam, participant.as_ref(), i64::from(attempt_number - 1), now);
    if !decision.is_allowed() {
        return Err(SubmitError::Denied(decision));
    }

    let submission_id = Uuid::new_v4().to_string();
    let mut submission = repositories::submissions::insert(
        &mut tx,
        repositories::submissions::CreateSubmission {
            id: &submission_id,
            exam_id: &exam.id,
            student_id,
            attempt_number,
            answers: &answers,
            max_score: max_score(questions),
            now,
        },
    )
    .await?;

    if let Some(participant) = participant {
        if participant.status != ParticipantStatus::Completed {
            repositories::participants::mark_completed(&mut tx, &participant.id, now).await?;
        }
    }

    if exam.kind.grades_on_submit() {
        let (score, question_results) = score_multiple_choice(questions, &answers);
        let graded = repositories::submissions::record_grade(
            &mut *tx,
            &submission_id,
            repositories::submissions::GradeUpdate {
                score,
                feedback: None,
                question_results,
                grader: GraderKind::MultipleChoice,
                graded_at: now,
            },
        )
        .await?;
        if let Some(graded) = graded {
            submission = graded;
        }
    }

    tx.commit().await?;

    metrics::counter!("submissions_total", "kind" => exam.kind.as_str()).increment(1);
    tracing::info!(
        exam_id = %exam.id,
        student_id,
        attempt_number,
        status = ?submission.status,
        "Attempt submitted"
    );

    Ok(submission)
}
