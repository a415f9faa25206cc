use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{entity::enums::RoleName, models::User};

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, message = "name must have at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "password must have at least 6 characters"))]
    pub password: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: RoleName,
    pub name: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub exp: usize,
}
