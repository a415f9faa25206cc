use axum::Router;

use crate::state::AppState;

pub mod auth;
pub mod cart;
pub mod doc;
pub mod health;
pub mod messages;
pub mod orders;
pub mod params;
pub mod products;
pub mod roles;
pub mod users;
pub mod ws;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/products", products::router())
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/users", users::router())
        .nest("/roles", roles::router())
        .nest("/messages", messages::router())
}
