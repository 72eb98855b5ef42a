use anyhow::{Context, Result};
use time::Duration;

use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::grading::{grade_and_record, Graders, GradingError};

/// Claims older than this are assumed to belong to a dead worker.
const STALE_CLAIM_MINUTES: i64 = 15;

pub(crate) async fn close_expired_exams(state: &AppState) -> Result<usize> {
    let closed = repositories::exams::close_expired(state.db(), primitive_now_utc())
        .await
        .context("Failed to close expired exams")?;

    if !closed.is_empty() {
        tracing::info!(closed = closed.len(), exam_ids = ?closed, "Closed exams past their end time");
        metrics::counter!("exams_closed_total").increment(closed.len() as u64);
    }

    Ok(closed.len())
}

/// Grades at most one pending submission. Returns `false` when the queue was empty.
pub(crate) async fn grade_next_pending(state: &AppState, graders: &Graders) -> Result<bool> {
    let max_attempts = state.settings().exam().max_grading_attempts;
    let sandbox_ready = state.settings().sandbox().is_configured();
    let claimed = repositories::submissions::claim_next_pending(
        state.db(),
        max_attempts,
        sandbox_ready,
        primitive_now_utc(),
    )
    .await
    .context("Failed to claim pending submission")?;

    let Some(submission_id) = claimed else {
        return Ok(false);
    };

    match grade_and_record(state.db(), graders, &submission_id).await {
        Ok(_) => {}
        // Failure is already stored on the row; the next claim retries it.
        Err(GradingError::Execution { .. } | GradingError::Evaluation { .. }) => {}
        Err(GradingError::AlreadyRevised | GradingError::NotFound) => {
            tracing::debug!(submission_id, "Submission left the queue before grading");
        }
        Err(GradingError::Database(err)) => {
            return Err(err).context("Failed to grade submission");
        }
    }

    Ok(true)
}

pub(crate) async fn release_stale_claims(state: &AppState) -> Result<u64> {
    let now = primitive_now_utc();
    let released = repositories::submissions::release_stale(
        state.db(),
        now - Duration::minutes(STALE_CLAIM_MINUTES),
        now,
    )
    .await
    .context("Failed to release stale grading claims")?;

    if released > 0 {
        tracing::warn!(released, "Released stale grading claims");
    }

    Ok(released)
}
