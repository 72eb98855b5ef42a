mod student;
mod teacher;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/my", get(student::list_my_submissions))
        .route("/:submission_id", get(student::get_submission))
        .route("/:submission_id/grade", post(teacher::grade_submission))
        .route("/:submission_id/revise", post(teacher::revise_submission))
}

/// Routes nested under `/exams`.
pub(crate) fn exam_router() -> Router<AppState> {
    Router::new().route(
        "/:exam_id/submissions",
        post(student::submit_attempt).get(teacher::list_exam_submissions),
    )
}

#[cfg(test)]
mod tests;
