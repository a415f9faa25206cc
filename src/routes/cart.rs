use axum::{
    Json, Router,
    extract::State,
    routing::{delete, get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::cart::{AddCartItemRequest, UpdateCartItemRequest},
    error::AppResult,
    extract::{AppJson, AppPath},
    middleware::auth::AuthUser,
    models::Cart,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/{product_id}", put(update_item).delete(remove_item))
        .route("/clear", delete(clear_cart))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Current cart, created on first access", body = ApiResponse<Cart>),
        (status = 401, description = "Missing or invalid token")
    ),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::get_cart(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<Cart>),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Product not found")
    ),
    tag = "Cart"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<AddCartItemRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::add_item(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = ApiResponse<Cart>),
        (status = 400, description = "Insufficient stock"),
        (status = 404, description = "Cart or line not found")
    ),
    tag = "Cart"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(product_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateCartItemRequest>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::update_item(&state, &user, product_id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{product_id}",
    params(
        ("product_id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Removed from cart", body = ApiResponse<Cart>),
        (status = 404, description = "Cart or line not found")
    ),
    tag = "Cart"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(product_id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::remove_item(&state, &user, product_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/cart/clear",
    responses(
        (status = 200, description = "Cart cleared", body = ApiResponse<Cart>),
        (status = 404, description = "Cart not found")
    ),
    tag = "Cart"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<Cart>>> {
    let resp = cart_service::clear_cart(&state, &user).await?;
    Ok(Json(resp))
}
