mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

/// Routes nested under `/exams`.
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/:exam_id/participants",
            get(handlers::list_participants).post(handlers::invite_participants),
        )
        .route("/:exam_id/join", post(handlers::join_exam))
        .route("/:exam_id/accept", post(handlers::accept_invitation))
        .route("/:exam_id/decline", post(handlers::decline_invitation))
        .route("/:exam_id/access", get(handlers::check_access))
}
