use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entity::enums::OrderStatus,
    models::{Order, OrderItem, ShippingAddress, UserSummary},
};

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateOrderRequest {
    #[validate(nested)]
    pub shipping_address: ShippingAddress,
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub user: UserSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderWithItems>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_address_fields_are_reported() {
        let req = CreateOrderRequest {
            shipping_address: ShippingAddress {
                street: "Main 1".into(),
                city: String::new(),
                postal_code: "1000".into(),
                country: "AR".into(),
            },
            phone: String::new(),
        };
        let errs = req.validate().unwrap_err();
        let all = errs.errors();
        assert!(all.contains_key("shipping_address"));
        assert!(all.contains_key("phone"));
    }

    #[test]
    fn status_parses_from_wire_name() {
        let req: UpdateOrderStatusRequest =
            serde_json::from_str(r#"{"status":"en_produccion"}"#).unwrap();
        assert_eq!(req.status, OrderStatus::InProduction);
        assert!(serde_json::from_str::<UpdateOrderStatusRequest>(r#"{"status":"lost"}"#).is_err());
    }
}
