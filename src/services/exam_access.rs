use serde::Serialize;
use time::PrimitiveDateTime;

use crate::db::models::{Exam, Participant};
use crate::db::types::{ExamStatus, ParticipantStatus};

/// Where a client should send a student who asked to take an exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Redirect {
    Dashboard,
    Invitation,
    Results,
    Exam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AccessDecision {
    Allowed,
    NotPublished,
    NotStarted,
    Ended,
    InvitationRequired,
    InvitationPending,
    Declined,
    AttemptsExhausted,
}

impl AccessDecision {
    pub(crate) fn redirect(self) -> Redirect {
        match self {
            Self::Allowed => Redirect::Exam,
            Self::NotPublished | Self::NotStarted | Self::Declined => Redirect::Dashboard,
            Self::InvitationRequired | Self::InvitationPending => Redirect::Invitation,
            Self::Ended | Self::AttemptsExhausted => Redirect::Results,
        }
    }

    pub(crate) fn is_allowed(self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub(crate) fn message(self) -> &'static str {
        match self {
            Self::Allowed => "Exam is available",
            Self::NotPublished => "Exam is not available",
            Self::NotStarted => "Exam has not started yet",
            Self::Ended => "Exam has ended",
            Self::InvitationRequired => "Join the exam before taking it",
            Self::InvitationPending => "Accept the invitation before taking the exam",
            Self::Declined => "Invitation was declined",
            Self::AttemptsExhausted => "No attempts left for this exam",
        }
    }
}

/// Decides whether a student may start or submit an attempt right now.
///
/// Exam-wide states are checked first, then the participant record, then the window,
/// then the attempt budget. Completed participants count as accepted.
pub(crate) fn evaluate_access(
    exam: &Exam,
    participant: Option<&Participant>,
    attempts_used: i64,
    now: PrimitiveDateTime,
) -> AccessDecision {
    match exam.status {
        ExamStatus::Draft => return AccessDecision::NotPublished,
        ExamStatus::Closed | ExamStatus::Graded => return AccessDecision::Ended,
        ExamStatus::Published => {}
    }

    let Some(participant) = participant else {
        return AccessDecision::InvitationRequired;
    };

    match participant.status {
        ParticipantStatus::Invited => return AccessDecision::InvitationPending,
        ParticipantStatus::Declined => return AccessDecision::Declined,
        ParticipantStatus::Accepted | ParticipantStatus::Completed => {}
    }

    if now < exam.start_time {
        return AccessDecision::NotStarted;
    }
    if now > exam.end_time {
        return AccessDecision::Ended;
    }

    if let Some(max_attempts) = exam.max_attempts {
        if attempts_used >= i64::from(max_attempts) {
            return AccessDecision::AttemptsExhausted;
        }
    }

    AccessDecision::Allowed
}
