use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

use crate::core::config::Settings;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Exam, Question, QuestionResult, Submission};
use crate::db::types::{ExamKind, GraderKind, SubmissionStatus};
use crate::repositories;
use crate::services::ai_grading::AiEvaluator;
use crate::services::code_runner::SandboxClient;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ExecutionRequest {
    pub(crate) source_code: String,
    pub(crate) language: String,
    pub(crate) stdin: Option<String>,
    pub(crate) expected_output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExecutionReport {
    pub(crate) status: String,
    pub(crate) stdout: Option<String>,
    pub(crate) stderr: Option<String>,
    pub(crate) compile_output: Option<String>,
    pub(crate) time_seconds: Option<f64>,
    pub(crate) memory_kb: Option<i64>,
    /// Set when an expected output was supplied and the sandbox compared it.
    pub(crate) passed: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct EvaluationRequest {
    pub(crate) kind: ExamKind,
    pub(crate) question: String,
    pub(crate) max_points: f64,
    pub(crate) answer: String,
    pub(crate) reference_solution: Option<String>,
    pub(crate) execution: Option<ExecutionReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Evaluation {
    pub(crate) score: f64,
    pub(crate) feedback: String,
}

#[async_trait]
pub(crate) trait CodeExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> anyhow::Result<ExecutionReport>;
}

#[async_trait]
pub(crate) trait AnswerEvaluator: Send + Sync {
    async fn evaluate(&self, request: EvaluationRequest) -> anyhow::Result<Evaluation>;
}

#[derive(Clone)]
pub(crate) struct Graders {
    pub(crate) executor: Arc<dyn CodeExecutor>,
    pub(crate) evaluator: Arc<dyn AnswerEvaluator>,
}

impl Graders {
    pub(crate) fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        Ok(Self {
            executor: Arc::new(SandboxClient::from_settings(settings)?),
            evaluator: Arc::new(AiEvaluator::from_settings(settings)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GradingOutcome {
    pub(crate) score: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) question_results: Vec<QuestionResult>,
    pub(crate) grader: GraderKind,
}

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("Submission not found")]
    NotFound,
    #[error("Submission was revised by a teacher")]
    AlreadyRevised,
    #[error("Code execution failed for question {question_id}: {message}")]
    Execution { question_id: String, message: String },
    #[error("Answer evaluation failed for question {question_id}: {message}")]
    Evaluation { question_id: String, message: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub(crate) fn grader_for(kind: ExamKind) -> GraderKind {
    match kind {
        ExamKind::Quiz => GraderKind::MultipleChoice,
        ExamKind::Code => GraderKind::CodeExecution,
        ExamKind::Document => GraderKind::AiEvaluation,
    }
}

pub(crate) fn clamp_score(score: f64, max_points: f64) -> f64 {
    if !score.is_finite() {
        return 0.0;
    }
    score.clamp(0.0, max_points)
}

fn is_multiple_choice(question: &Question) -> bool {
    question.options.is_some()
}

fn mcq_result(question: &Question, answer: Option<&Value>) -> QuestionResult {
    let chosen = answer.and_then(Value::as_i64);
    let correct = matches!(
        (chosen, question.correct_option),
        (Some(chosen), Some(correct)) if chosen == i64::from(correct)
    );

    QuestionResult {
        question_id: question.id.clone(),
        score: if correct { question.max_points } else { 0.0 },
        max_points: question.max_points,
        feedback: None,
        execution: None,
    }
}

/// Scores every multiple-choice question; returns the total and per-question results.
pub(crate) fn score_multiple_choice(
    questions: &[Question],
    answers: &BTreeMap<String, Value>,
) -> (f64, Vec<QuestionResult>) {
    let results: Vec<QuestionResult> = questions
        .iter()
        .filter(|question| is_multiple_choice(question))
        .map(|question| mcq_result(question, answers.get(&question.id)))
        .collect();
    let total = results.iter().map(|result| result.score).sum();
    (total, results)
}

fn answer_text(answer: Option<&Value>) -> Option<&str> {
    answer.and_then(Value::as_str).map(str::trim).filter(|text| !text.is_empty())
}

async fn grade_open_question(
    kind: ExamKind,
    question: &Question,
    answer: &str,
    graders: &Graders,
) -> Result<QuestionResult, GradingError> {
    let execution = if kind == ExamKind::Code {
        let request = ExecutionRequest {
            source_code: answer.to_string(),
            language: question.language.clone().unwrap_or_default(),
            stdin: None,
            expected_output: question.expected_output.clone(),
        };
        let report = graders.executor.execute(request).await.map_err(|err| {
            GradingError::Execution { question_id: question.id.clone(), message: format!("{err:#}") }
        })?;
        Some(report)
    } else {
        None
    };

    let evaluation = graders
        .evaluator
        .evaluate(EvaluationRequest {
            kind,
            question: question.text.clone(),
            max_points: question.max_points,
            answer: answer.to_string(),
            reference_solution: question.reference_solution.clone(),
            execution: execution.clone(),
        })
        .await
        .map_err(|err| GradingError::Evaluation {
            question_id: question.id.clone(),
            message: format!("{err:#}"),
        })?;

    Ok(QuestionResult {
        question_id: question.id.clone(),
        score: clamp_score(evaluation.score, question.max_points),
        max_points: question.max_points,
        feedback: Some(evaluation.feedback),
        execution: execution.and_then(|report| serde_json::to_value(report).ok()),
    })
}

/// Grades a full answer set. Multiple-choice questions are scored locally; open
/// questions go through the sandbox (code exams) and the evaluator.
pub(crate) async fn grade_answers(
    kind: ExamKind,
    questions: &[Question],
    answers: &BTreeMap<String, Value>,
    graders: &Graders,
) -> Result<GradingOutcome, GradingError> {
    let mut question_results = Vec::with_capacity(questions.len());
    let mut feedback_lines = Vec::new();

    for (position, question) in questions.iter().enumerate() {
        let answer = answers.get(&question.id);
        let result = if is_multiple_choice(question) {
            mcq_result(question, answer)
        } else if let Some(text) = answer_text(answer) {
            grade_open_question(kind, question, text, graders).await?
        } else {
            QuestionResult {
                question_id: question.id.clone(),
                score: 0.0,
                max_points: question.max_points,
                feedback: Some("No answer submitted".to_string()),
                execution: None,
            }
        };

        if let Some(feedback) = &result.feedback {
            feedback_lines.push(format!("Question {}: {}", position + 1, feedback));
        }
        question_results.push(result);
    }

    let score = question_results.iter().map(|result| result.score).sum();
    let feedback = (!feedback_lines.is_empty()).then(|| feedback_lines.join("\n"));

    Ok(GradingOutcome { score, feedback, question_results, grader: grader_for(kind) })
}

/// Grades a stored submission and persists the result. Failures are written to
/// `grading_error` so the worker can retry.
pub(crate) async fn grade_and_record(
    pool: &PgPool,
    graders: &Graders,
    submission_id: &str,
) -> Result<Submission, GradingError> {
    let submission = repositories::submissions::find_by_id(pool, submission_id)
        .await?
        .ok_or(GradingError::NotFound)?;
    if submission.status == SubmissionStatus::Revised {
        return Err(GradingError::AlreadyRevised);
    }

    let exam: Exam = repositories::exams::find_by_id(pool, &submission.exam_id)
        .await?
        .ok_or(GradingError::NotFound)?;
    let questions = repositories::questions::list_by_exam(pool, &exam.id).await?;

    let timer = Instant::now();
    let outcome = grade_answers(exam.kind, &questions, &submission.answers.0, graders).await;
    let kind_label = exam.kind.as_str();
    metrics::histogram!("grading_duration_seconds", "kind" => kind_label)
        .record(timer.elapsed().as_secs_f64());

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            metrics::counter!("grading_jobs_total", "kind" => kind_label, "result" => "failed")
                .increment(1);
            tracing::warn!(submission_id, error = %err, "Grading failed");
            repositories::submissions::record_failure(
                pool,
                submission_id,
                &err.to_string(),
                primitive_now_utc(),
            )
            .await?;
            return Err(err);
        }
    };

    let updated = repositories::submissions::record_grade(
        pool,
        submission_id,
        repositories::submissions::GradeUpdate {
            score: outcome.score,
            feedback: outcome.feedback,
            question_results: outcome.question_results,
            grader: outcome.grader,
            graded_at: primitive_now_utc(),
        },
    )
    .await?
    .ok_or(GradingError::AlreadyRevised)?;

    metrics::counter!("grading_jobs_total", "kind" => kind_label, "result" => "graded").increment(1);
    tracing::info!(
        submission_id,
        score = updated.score,
        max_score = updated.max_score,
        "Submission graded"
    );

    Ok(updated)
}
