use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examkind", rename_all = "lowercase")]
pub(crate) enum ExamKind {
    Quiz,
    Code,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Closed,
    Graded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "participantstatus", rename_all = "lowercase")]
pub(crate) enum ParticipantStatus {
    Invited,
    Accepted,
    Declined,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submissionstatus", rename_all = "lowercase")]
pub(crate) enum SubmissionStatus {
    Pending,
    Corrected,
    Revised,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "graderkind", rename_all = "snake_case")]
pub(crate) enum GraderKind {
    MultipleChoice,
    CodeExecution,
    AiEvaluation,
    Teacher,
}

impl ExamKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Quiz => "quiz",
            Self::Code => "code",
            Self::Document => "document",
        }
    }

    /// Quiz attempts are scored on submit; the others wait for an external grader.
    pub(crate) fn grades_on_submit(self) -> bool {
        matches!(self, Self::Quiz)
    }
}
