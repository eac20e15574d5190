use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::users::{AuthResponse, LoginRequest, RegisterRequest, UserResponse},
    ApiResponse, ApiResult, AppState,
};

/// Create a customer account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.users.register(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Invalid email or password", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<AuthResponse> {
    let session = state.services.users.login(payload).await?;
    Ok(Json(ApiResponse::success(session)))
}

/// The signed-in account
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current account", body = ApiResponse<UserResponse>),
        (status = 401, description = "Missing or invalid token", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserResponse> {
    let account = state.services.users.get_user(user.user_id).await?;
    Ok(Json(ApiResponse::success(account)))
}
