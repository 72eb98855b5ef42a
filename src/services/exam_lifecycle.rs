use serde::Serialize;
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::models::Question;
use crate::db::types::{ExamKind, ExamStatus};

/// What a viewer sees for an exam at a point in time. Published exams are split by
/// their window; every other status maps onto itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ExamPhase {
    Draft,
    Scheduled,
    Open,
    Ended,
    Closed,
    Graded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExamTransition {
    Publish,
    Close,
    Finalize,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum LifecycleError {
    #[error("Cannot {action} an exam with status '{from}'")]
    InvalidTransition { action: &'static str, from: &'static str },
    #[error("Exam must have at least one question")]
    NoQuestions,
    #[error("Question {index} must have at least two options")]
    TooFewOptions { index: usize },
    #[error("Question {index} has an invalid correct option")]
    InvalidCorrectOption { index: usize },
    #[error("Question {index} must be multiple choice in a quiz exam")]
    NotMultipleChoice { index: usize },
    #[error("Question {index} needs a programming language")]
    MissingLanguage { index: usize },
    #[error("{0} submission(s) are still pending grading")]
    PendingSubmissions(i64),
    #[error("Exam end time must be after its start time")]
    InvalidWindow,
    #[error("Questions can only be changed while the exam is a draft")]
    NotDraft,
}

pub(crate) fn status_label(status: ExamStatus) -> &'static str {
    match status {
        ExamStatus::Draft => "draft",
        ExamStatus::Published => "published",
        ExamStatus::Closed => "closed",
        ExamStatus::Graded => "graded",
    }
}

impl ExamTransition {
    pub(crate) fn action(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Close => "close",
            Self::Finalize => "finalize",
        }
    }

    fn edge(self) -> (ExamStatus, ExamStatus) {
        match self {
            Self::Publish => (ExamStatus::Draft, ExamStatus::Published),
            Self::Close => (ExamStatus::Published, ExamStatus::Closed),
            Self::Finalize => (ExamStatus::Closed, ExamStatus::Graded),
        }
    }

    /// Source status the transition requires and the status it produces.
    pub(crate) fn check(self, current: ExamStatus) -> Result<(ExamStatus, ExamStatus), LifecycleError> {
        let (from, to) = self.edge();
        if current != from {
            return Err(LifecycleError::InvalidTransition {
                action: self.action(),
                from: status_label(current),
            });
        }
        Ok((from, to))
    }
}

pub(crate) fn phase(
    status: ExamStatus,
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
    now: PrimitiveDateTime,
) -> ExamPhase {
    match status {
        ExamStatus::Draft => ExamPhase::Draft,
        ExamStatus::Closed => ExamPhase::Closed,
        ExamStatus::Graded => ExamPhase::Graded,
        ExamStatus::Published if now < start_time => ExamPhase::Scheduled,
        ExamStatus::Published if now > end_time => ExamPhase::Ended,
        ExamStatus::Published => ExamPhase::Open,
    }
}

pub(crate) fn check_window(
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
) -> Result<(), LifecycleError> {
    if end_time <= start_time {
        return Err(LifecycleError::InvalidWindow);
    }
    Ok(())
}

/// Shape rules a single question must satisfy for the exam kind. `index` is 1-based
/// and only used for messages.
pub(crate) fn check_question_shape(
    kind: ExamKind,
    index: usize,
    options: Option<&[String]>,
    correct_option: Option<i32>,
    language: Option<&str>,
) -> Result<(), LifecycleError> {
    match options {
        Some(options) => {
            if options.len() < 2 {
                return Err(LifecycleError::TooFewOptions { index });
            }
            let valid = correct_option
                .and_then(|value| usize::try_from(value).ok())
                .is_some_and(|value| value < options.len());
            if !valid {
                return Err(LifecycleError::InvalidCorrectOption { index });
            }
        }
        None if kind == ExamKind::Quiz => {
            return Err(LifecycleError::NotMultipleChoice { index });
        }
        None if kind == ExamKind::Code => {
            if language.map(str::trim).unwrap_or_default().is_empty() {
                return Err(LifecycleError::MissingLanguage { index });
            }
        }
        None => {}
    }
    Ok(())
}

pub(crate) fn check_publishable(kind: ExamKind, questions: &[Question]) -> Result<(), LifecycleError> {
    if questions.is_empty() {
        return Err(LifecycleError::NoQuestions);
    }

    for (position, question) in questions.iter().enumerate() {
        check_question_shape(
            kind,
            position + 1,
            question.options.as_ref().map(|options| options.0.as_slice()),
            question.correct_option,
            question.language.as_deref(),
        )?;
    }
    Ok(())
}

pub(crate) fn check_finalizable(pending_submissions: i64) -> Result<(), LifecycleError> {
    if pending_submissions > 0 {
        return Err(LifecycleError::PendingSubmissions(pending_submissions));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::macros::datetime;

    fn question(options: Option<Vec<&str>>, correct: Option<i32>, language: Option<&str>) -> Question {
        let now = datetime!(2025-01-01 00:00:00);
        Question {
            id: "q1".to_string(),
            exam_id: "e1".to_string(),
            order_index: 0,
            text: "What?".to_string(),
            max_points: 2.0,
            options: options.map(|items| Json(items.into_iter().map(String::from).collect())),
            correct_option: correct,
            language: language.map(String::from),
            reference_solution: None,
            expected_output: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn transitions_follow_the_status_chain() {
        assert_eq!(
            ExamTransition::Publish.check(ExamStatus::Draft),
            Ok((ExamStatus::Draft, ExamStatus::Published))
        );
        assert_eq!(
            ExamTransition::Close.check(ExamStatus::Published),
            Ok((ExamStatus::Published, ExamStatus::Closed))
        );
        assert_eq!(
            ExamTransition::Finalize.check(ExamStatus::Closed),
            Ok((ExamStatus::Closed, ExamStatus::Graded))
        );
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let err = ExamTransition::Close.check(ExamStatus::Draft).unwrap_err();
        assert_eq!(err, LifecycleError::InvalidTransition { action: "close", from: "draft" });
        assert!(ExamTransition::Publish.check(ExamStatus::Graded).is_err());
        assert!(ExamTransition::Finalize.check(ExamStatus::Published).is_err());
        assert!(ExamTransition::Publish.check(ExamStatus::Published).is_err());
    }

    #[test]
    fn phase_splits_published_by_window() {
        let start = datetime!(2025-03-01 09:00:00);
        let end = datetime!(2025-03-01 11:00:00);

        assert_eq!(
            phase(ExamStatus::Published, start, end, datetime!(2025-03-01 08:59:59)),
            ExamPhase::Scheduled
        );
        assert_eq!(phase(ExamStatus::Published, start, end, start), ExamPhase::Open);
        assert_eq!(phase(ExamStatus::Published, start, end, end), ExamPhase::Open);
        assert_eq!(
            phase(ExamStatus::Published, start, end, datetime!(2025-03-01 11:00:01)),
            ExamPhase::Ended
        );
        assert_eq!(phase(ExamStatus::Draft, start, end, start), ExamPhase::Draft);
        assert_eq!(phase(ExamStatus::Graded, start, end, start), ExamPhase::Graded);
    }

    #[test]
    fn publish_requires_questions() {
        assert_eq!(check_publishable(ExamKind::Quiz, &[]), Err(LifecycleError::NoQuestions));
    }

    #[test]
    fn multiple_choice_questions_need_two_options_and_valid_answer() {
        let single = question(Some(vec!["a"]), Some(0), None);
        assert_eq!(
            check_publishable(ExamKind::Quiz, &[single]),
            Err(LifecycleError::TooFewOptions { index: 1 })
        );

        let out_of_range = question(Some(vec!["a", "b"]), Some(2), None);
        assert_eq!(
            check_publishable(ExamKind::Quiz, &[out_of_range]),
            Err(LifecycleError::InvalidCorrectOption { index: 1 })
        );

        let missing = question(Some(vec!["a", "b"]), None, None);
        assert!(check_publishable(ExamKind::Quiz, &[missing]).is_err());

        let ok = question(Some(vec!["a", "b", "c"]), Some(2), None);
        assert!(check_publishable(ExamKind::Quiz, &[ok]).is_ok());
    }

    #[test]
    fn quiz_rejects_open_questions_and_code_requires_language() {
        let open = question(None, None, None);
        assert_eq!(
            check_publishable(ExamKind::Quiz, &[open.clone()]),
            Err(LifecycleError::NotMultipleChoice { index: 1 })
        );
        assert_eq!(
            check_publishable(ExamKind::Code, &[open.clone()]),
            Err(LifecycleError::MissingLanguage { index: 1 })
        );
        assert!(check_publishable(ExamKind::Document, &[open]).is_ok());
        assert!(check_publishable(ExamKind::Code, &[question(None, None, Some("python"))]).is_ok());
    }

    #[test]
    fn finalize_blocks_on_pending_work() {
        assert_eq!(check_finalizable(2), Err(LifecycleError::PendingSubmissions(2)));
        assert!(check_finalizable(0).is_ok());
    }

    #[test]
    fn window_must_be_positive() {
        let start = datetime!(2025-03-01 09:00:00);
        assert_eq!(check_window(start, start), Err(LifecycleError::InvalidWindow));
        assert!(check_window(start, datetime!(2025-03-01 09:00:01)).is_ok());
    }
}
