use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    /// Defaults to 1.
    #[validate(range(min = 1, message = "quantity must be a positive integer"))]
    pub quantity: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "quantity must be a positive integer"))]
    pub quantity: i32,
}
