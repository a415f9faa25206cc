use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{entity::enums::UserStatus, models::User};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must have at least 6 characters"))]
    pub password: String,
    pub phone: Option<String>,
    /// Unknown or missing roles fall back to `cliente`.
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    #[validate(email(message = "must be a valid email"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role_id: Option<Uuid>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<User>)]
    pub items: Vec<User>,
}

#[derive(Debug, Serialize, ToSchema, PartialEq)]
pub struct OrderStats {
    pub total_sales: i64,
    pub order_count: i64,
    pub average_sale: Option<f64>,
    pub max_sale: Option<i64>,
    pub min_sale: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub products: i64,
    pub users: i64,
    pub order_stats: OrderStats,
}
