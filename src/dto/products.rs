use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{entity::enums::ProductStatus, models::Product};

pub const MAX_PRICE: i64 = 10_000_000_000;
pub const MAX_STOCK: i32 = 1_000_000;

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(range(min = 0, max = MAX_PRICE, message = "price must be between 0 and 10000000000"))]
    pub price: i64,
    #[validate(length(min = 1, message = "category is required"))]
    pub category: String,
    #[validate(range(min = 0, max = MAX_STOCK, message = "stock must be between 0 and 1000000"))]
    pub stock: i32,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "description must not be empty"))]
    pub description: Option<String>,
    #[validate(range(min = 0, max = MAX_PRICE, message = "price must be between 0 and 10000000000"))]
    pub price: Option<i64>,
    #[validate(length(min = 1, message = "category must not be empty"))]
    pub category: Option<String>,
    #[validate(range(min = 0, max = MAX_STOCK, message = "stock must be between 0 and 1000000"))]
    pub stock: Option<i32>,
    pub image_url: Option<String>,
    pub status: Option<ProductStatus>,
}

#[derive(Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}
