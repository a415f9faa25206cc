use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::auth::{AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest},
    error::AppResult,
    extract::AppJson,
    response::ApiResponse,
    services::auth_service::{login_user, refresh_token, register_user},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Register user", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Validation failed or email already registered")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
    let resp = register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login user", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid credentials"),
        (status = 401, description = "User is inactive")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let resp = login_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/auth/refresh-token",
    request_body = RefreshTokenRequest,
    responses(
        (status = 200, description = "New token pair", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Refresh token invalid or expired")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RefreshTokenRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let resp = refresh_token(&state, payload).await?;
    Ok(Json(resp))
}
