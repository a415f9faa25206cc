use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum RoleName {
    #[sea_orm(string_value = "admin")]
    #[serde(rename = "admin")]
    Admin,
    #[sea_orm(string_value = "cliente")]
    #[serde(rename = "cliente")]
    Customer,
}

impl RoleName {
    pub fn description(&self) -> &'static str {
        match self {
            RoleName::Admin => "System administrator",
            RoleName::Customer => "Store customer",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum UserStatus {
    #[sea_orm(string_value = "activo")]
    #[serde(rename = "activo")]
    Active,
    #[sea_orm(string_value = "inactivo")]
    #[serde(rename = "inactivo")]
    Inactive,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum ProductStatus {
    #[sea_orm(string_value = "disponible")]
    #[serde(rename = "disponible")]
    Available,
    #[sea_orm(string_value = "agotado")]
    #[serde(rename = "agotado")]
    OutOfStock,
    #[sea_orm(string_value = "descontinuado")]
    #[serde(rename = "descontinuado")]
    Discontinued,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pendiente")]
    #[serde(rename = "pendiente")]
    Pending,
    #[sea_orm(string_value = "en_produccion")]
    #[serde(rename = "en_produccion")]
    InProduction,
    #[sea_orm(string_value = "enviando")]
    #[serde(rename = "enviando")]
    Shipping,
    #[sea_orm(string_value = "entregado")]
    #[serde(rename = "entregado")]
    Delivered,
    #[sea_orm(string_value = "cancelado")]
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl OrderStatus {
    /// Statuses reachable from `self` in one step. Delivered and cancelled are terminal.
    pub fn next_statuses(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::InProduction, OrderStatus::Cancelled],
            OrderStatus::InProduction => &[OrderStatus::Shipping, OrderStatus::Cancelled],
            OrderStatus::Shipping => &[OrderStatus::Delivered],
            OrderStatus::Delivered | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }
}
