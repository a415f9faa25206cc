use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entity::{
    cart_items, carts, messages,
    enums::{OrderStatus, ProductStatus, RoleName, UserStatus},
    order_items, orders, products, roles, users,
};

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Role {
    pub id: Uuid,
    pub name: RoleName,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<roles::Model> for Role {
    fn from(model: roles::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

/// Public view of a user. The password hash never leaves the service layer.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub role_id: Uuid,
    pub role: Option<RoleName>,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn from_entity(model: users::Model, role: Option<&roles::Model>) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            phone: model.phone,
            address: model.address,
            role_id: model.role_id,
            role: role.map(|r| r.name),
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

/// Owner details attached to order responses.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

impl UserSummary {
    /// Stand-in for orders whose owner has since been deleted.
    pub fn missing(id: Uuid) -> Self {
        Self {
            id,
            name: "User not found".to_string(),
            email: String::new(),
            phone: None,
        }
    }
}

impl From<&users::Model> for UserSummary {
    fn from(model: &users::Model) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            email: model.email.clone(),
            phone: model.phone.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category: String,
    pub stock: i32,
    pub image_url: String,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<products::Model> for Product {
    fn from(model: products::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: model.price,
            category: model.category,
            stock: model.stock,
            image_url: model.image_url,
            status: model.status,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct CartItem {
    pub id: Uuid,
    pub product: Option<Product>,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

impl CartItem {
    pub fn from_entity(model: cart_items::Model, product: Option<products::Model>) -> Self {
        Self {
            id: model.id,
            product: product.map(Product::from),
            product_id: model.product_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            subtotal: model.subtotal,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total: i64,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn from_entity(model: carts::Model, items: Vec<CartItem>) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            items,
            total: model.total,
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Validate)]
pub struct ShippingAddress {
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub total: i64,
    pub status: OrderStatus,
    pub shipping_address: ShippingAddress,
    pub phone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<orders::Model> for Order {
    fn from(model: orders::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            total: model.total,
            status: model.status,
            shipping_address: ShippingAddress {
                street: model.ship_street,
                city: model.ship_city,
                postal_code: model.ship_postal_code,
                country: model.ship_country,
            },
            phone: model.phone,
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image: String,
    pub quantity: i32,
    pub unit_price: i64,
    pub subtotal: i64,
}

impl From<order_items::Model> for OrderItem {
    fn from(model: order_items::Model) -> Self {
        Self {
            product_id: model.product_id,
            product_name: model.product_name,
            product_image: model.product_image,
            quantity: model.quantity,
            unit_price: model.unit_price,
            subtotal: model.subtotal,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

impl From<messages::Model> for Message {
    fn from(model: messages::Model) -> Self {
        Self {
            id: model.id,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            text: model.text,
            image: model.image,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
