use axum::{extract::State, Json};

use crate::{services::stats::StoreStats, ApiResponse, ApiResult, AppState};

#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Store counters", body = ApiResponse<StoreStats>),
        (status = 403, description = "Administrators only", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn store_stats(State(state): State<AppState>) -> ApiResult<StoreStats> {
    let stats = state.services.stats.store_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
