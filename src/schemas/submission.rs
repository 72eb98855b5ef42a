use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::format_primitive;
use crate::db::models::{QuestionResult, Submission};
use crate::db::types::{GraderKind, SubmissionStatus};
use crate::repositories::submissions::{ExamSubmissionRow, StudentSubmissionRow};

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    #[serde(default)]
    pub(crate) answers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReviseRequest {
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    #[validate(length(max = 10000, message = "feedback is too long"))]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamSubmissionsQuery {
    #[serde(default)]
    pub(crate) status: Option<SubmissionStatus>,
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MySubmissionsQuery {
    #[serde(default, alias = "examId")]
    pub(crate) exam_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) answers: BTreeMap<String, serde_json::Value>,
    pub(crate) status: SubmissionStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) question_results: Vec<QuestionResult>,
    pub(crate) grader: Option<GraderKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) grading_error: Option<String>,
    pub(crate) grading_attempts: i32,
    pub(crate) submitted_at: String,
    pub(crate) graded_at: Option<String>,
    pub(crate) reviewed_by: Option<String>,
    pub(crate) reviewed_at: Option<String>,
}

impl SubmissionResponse {
    /// Grading errors are operational detail and only shown to the exam owner.
    pub(crate) fn from_db(submission: Submission, include_errors: bool) -> Self {
        Self {
            id: submission.id,
            exam_id: submission.exam_id,
            student_id: submission.student_id,
            attempt_number: submission.attempt_number,
            answers: submission.answers.0,
            status: submission.status,
            score: submission.score,
            max_score: submission.max_score,
            feedback: submission.feedback,
            question_results: submission.question_results.0,
            grader: submission.grader,
            grading_error: submission.grading_error.filter(|_| include_errors),
            grading_attempts: submission.grading_attempts,
            submitted_at: format_primitive(submission.submitted_at),
            graded_at: submission.graded_at.map(format_primitive),
            reviewed_by: submission.reviewed_by,
            reviewed_at: submission.reviewed_at.map(format_primitive),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSubmissionItem {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) student_username: String,
    pub(crate) student_name: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SubmissionStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) grading_error: Option<String>,
    pub(crate) submitted_at: String,
}

impl ExamSubmissionItem {
    pub(crate) fn from_row(row: ExamSubmissionRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            student_username: row.student_username,
            student_name: row.student_name,
            attempt_number: row.attempt_number,
            status: row.status,
            score: row.score,
            max_score: row.max_score,
            grading_error: row.grading_error,
            submitted_at: format_primitive(row.submitted_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct MySubmissionItem {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) exam_title: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: SubmissionStatus,
    pub(crate) score: Option<f64>,
    pub(crate) max_score: f64,
    pub(crate) submitted_at: String,
}

impl MySubmissionItem {
    pub(crate) fn from_row(row: StudentSubmissionRow) -> Self {
        Self {
            id: row.id,
            exam_id: row.exam_id,
            exam_title: row.exam_title,
            attempt_number: row.attempt_number,
            status: row.status,
            score: row.score,
            max_score: row.max_score,
            submitted_at: format_primitive(row.submitted_at),
        }
    }
}
