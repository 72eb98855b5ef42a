mod handlers;
pub(crate) mod helpers;

use axum::{routing::get, routing::post, Router};

use crate::api::{participants, submissions};
use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route(
            "/:exam_id",
            get(handlers::get_exam).patch(handlers::update_exam).delete(handlers::delete_exam),
        )
        .route("/:exam_id/questions", post(handlers::add_questions))
        .route("/:exam_id/publish", post(handlers::publish_exam))
        .route("/:exam_id/close", post(handlers::close_exam))
        .route("/:exam_id/finalize", post(handlers::finalize_exam))
        .merge(participants::router())
        .merge(submissions::exam_router())
}

#[cfg(test)]
mod tests;
