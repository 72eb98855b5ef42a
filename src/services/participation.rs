use thiserror::Error;

use crate::db::types::ParticipantStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParticipantAction {
    Join,
    Accept,
    Decline,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ParticipationError {
    #[error("No invitation found for this exam")]
    NotInvited,
    #[error("Participation is already completed")]
    Completed,
    #[error("Cannot decline an accepted invitation")]
    AlreadyAccepted,
}

impl ParticipantAction {
    fn target(self) -> ParticipantStatus {
        match self {
            Self::Join | Self::Accept => ParticipantStatus::Accepted,
            Self::Decline => ParticipantStatus::Declined,
        }
    }
}

/// Status a participant moves to. `Ok(None)` means the participant is already there.
///
/// Joining creates a row when none exists; accepting and declining need an invitation.
/// Completed participants are frozen.
pub(crate) fn next_status(
    action: ParticipantAction,
    current: Option<ParticipantStatus>,
) -> Result<Option<ParticipantStatus>, ParticipationError> {
    let target = action.target();

    let Some(current) = current else {
        return match action {
            ParticipantAction::Join => Ok(Some(target)),
            ParticipantAction::Accept | ParticipantAction::Decline => {
                Err(ParticipationError::NotInvited)
            }
        };
    };

    if current == target {
        return Ok(None);
    }

    match (current, action) {
        (ParticipantStatus::Completed, ParticipantAction::Join | ParticipantAction::Accept) => {
            Ok(None)
        }
        (ParticipantStatus::Completed, ParticipantAction::Decline) => {
            Err(ParticipationError::Completed)
        }
        (ParticipantStatus::Accepted, ParticipantAction::Decline) => {
            Err(ParticipationError::AlreadyAccepted)
        }
        _ => Ok(Some(target)),
    }
}

/// Usernames as typed by a teacher: trimmed, blanks dropped, first occurrence kept.
pub(crate) fn normalize_usernames(usernames: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    usernames
        .iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}
