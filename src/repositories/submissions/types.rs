use std::collections::BTreeMap;

use time::PrimitiveDateTime;

use crate::db::models::QuestionResult;
use crate::db::types::{GraderKind, SubmissionStatus};

pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, answers, status, score, max_score, feedback, \
    question_results, grader, grading_error, grading_attempts, grading_started_at, graded_at, \
    reviewed_by, reviewed_at, submitted_at, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExamSubmissionRow {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) student_username: String,
    pub(crate) student_name: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SubmissionStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) grading_error: Option<String>,
    pub(crate) submitted_at: PrimitiveDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct StudentSubmissionRow {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SubmissionStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) submitted_at: PrimitiveDateTime,
}

pub(crate) struct CreateSubmission<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) answers: &'a BTreeMap<String, serde_json::Value>,
    pub(crate) max_score: f64,
    pub(crate) now: PrimitiveDateTime,
}

pub(crate) struct GradeUpdate {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) question_results: Vec<QuestionResult>,
    pub(crate) grader: GraderKind,
    pub(crate) graded_at: PrimitiveDateTime,
}
