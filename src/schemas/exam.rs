use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::api::pagination::default_limit;
use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question};
use crate::db::types::{ExamKind, ExamStatus};
use crate::services::exam_lifecycle::ExamPhase;

#[derive(Debug, Deserialize, Serialize, Validate)]
pub(crate) struct QuestionCreate {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub(crate) text: String,
    #[serde(alias = "maxPoints")]
    #[validate(range(exclusive_min = 0.0, message = "max_points must be positive"))]
    pub(crate) max_points: f64,
    #[serde(default)]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default, alias = "correctOption")]
    pub(crate) correct_option: Option<i32>,
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "language must be 1-32 characters"))]
    pub(crate) language: Option<String>,
    #[serde(default, alias = "referenceSolution")]
    pub(crate) reference_solution: Option<String>,
    #[serde(default, alias = "expectedOutput")]
    pub(crate) expected_output: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    pub(crate) kind: ExamKind,
    #[serde(alias = "startTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(default, alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default, alias = "requireJoinCode")]
    pub(crate) require_join_code: bool,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

/// Partial update. For `description` and `max_attempts` an explicit `null` clears the
/// value while an absent field leaves it alone.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub(crate) title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_present")]
    pub(crate) description: Option<Option<String>>,
    #[serde(
        default,
        alias = "startTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default, alias = "maxAttempts", deserialize_with = "deserialize_present")]
    pub(crate) max_attempts: Option<Option<i32>>,
    /// `true` issues a fresh join code, `false` removes it.
    #[serde(default, alias = "requireJoinCode")]
    pub(crate) require_join_code: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionsAppend {
    #[validate(length(min = 1, message = "questions must not be empty"), nested)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamListQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
    #[serde(default)]
    pub(crate) status: Option<ExamStatus>,
    #[serde(default)]
    pub(crate) kind: Option<ExamKind>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct DeleteExamQuery {
    #[serde(default)]
    pub(crate) force: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) order_index: i32,
    pub(crate) text: String,
    pub(crate) max_points: f64,
    pub(crate) options: Option<Vec<String>>,
    pub(crate) language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_option: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) reference_solution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) expected_output: Option<String>,
}

impl QuestionResponse {
    /// `with_answers` controls whether grading keys are included.
    pub(crate) fn from_db(question: Question, with_answers: bool) -> Self {
        Self {
            id: question.id,
            order_index: question.order_index,
            text: question.text,
            max_points: question.max_points,
            options: question.options.map(|options| options.0),
            language: question.language,
            correct_option: question.correct_option.filter(|_| with_answers),
            reference_solution: question.reference_solution.filter(|_| with_answers),
            expected_output: question.expected_output.filter(|_| with_answers),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) kind: ExamKind,
    pub(crate) status: ExamStatus,
    pub(crate) phase: ExamPhase,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) requires_join_code: bool,
    /// Plain join code, only returned when it was just issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) join_code: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) published_at: Option<String>,
    pub(crate) closed_at: Option<String>,
    pub(crate) questions: Vec<QuestionResponse>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamSummaryResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) kind: ExamKind,
    pub(crate) status: ExamStatus,
    pub(crate) phase: ExamPhase,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) requires_join_code: bool,
}

impl ExamSummaryResponse {
    pub(crate) fn from_db(exam: Exam, phase: ExamPhase) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            kind: exam.kind,
            status: exam.status,
            phase,
            start_time: format_primitive(exam.start_time),
            end_time: format_primitive(exam.end_time),
            max_attempts: exam.max_attempts,
            requires_join_code: exam.join_code_hash.is_some(),
        }
    }
}

pub(crate) fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs arrive without an offset; treat them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
