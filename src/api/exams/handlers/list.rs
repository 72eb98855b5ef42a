use axum::extract::{Query, State};
use axum::Json;

use crate::api::errors::ApiError;
use crate::api::guards::{is_staff, CurrentUser};
use crate::api::pagination::PaginatedResponse;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::repositories::exams::ExamListFilter;
use crate::schemas::exam::{ExamListQuery, ExamSummaryResponse};
use crate::services::exam_lifecycle::phase;

/// Staff see the exams they own; students see every non-draft exam they have not declined.
pub(in crate::api::exams) async fn list_exams(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(params): Query<ExamListQuery>,
) -> Result<Json<PaginatedResponse<ExamSummaryResponse>>, ApiError> {
    let filter = ExamListFilter { status: params.status, kind: params.kind };

    let (exams, total_count) = if is_staff(&user) {
        let exams = repositories::exams::list_owned(
            state.db(),
            &user.id,
            &filter,
            params.skip,
            params.limit,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
        let total = repositories::exams::count_owned(state.db(), &user.id, &filter)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;
        (exams, total)
    } else {
        let exams = repositories::exams::list_visible_to_student(
            state.db(),
            &user.id,
            &filter,
            params.skip,
            params.limit,
        )
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
        let total = repositories::exams::count_visible_to_student(state.db(), &user.id, &filter)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;
        (exams, total)
    };

    let now = primitive_now_utc();
    let items = exams
        .into_iter()
        .map(|exam| {
            let exam_phase = phase(exam.status, exam.start_time, exam.end_time, now);
            ExamSummaryResponse::from_db(exam, exam_phase)
        })
        .collect();

    Ok(Json(PaginatedResponse::new(items, total_count, params.skip, params.limit)))
}
