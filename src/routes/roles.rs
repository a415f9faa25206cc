use axum::{Json, Router, extract::State, routing::get};

use crate::{
    error::AppResult,
    middleware::auth::AuthUser,
    models::Role,
    response::ApiResponse,
    services::role_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_roles))
}

#[utoipa::path(
    get,
    path = "/api/roles",
    responses(
        (status = 200, description = "All roles", body = ApiResponse<Vec<Role>>),
        (status = 403, description = "Admin only")
    ),
    tag = "Roles"
)]
pub async fn list_roles(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<Role>>>> {
    let resp = role_service::list_roles(&state, &user).await?;
    Ok(Json(resp))
}
