use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems, UpdateOrderStatusRequest},
    entity::{
        cart_items::{self, Column as CartItemCol, Entity as CartItems},
        enums::{OrderStatus, ProductStatus},
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{self, ActiveModel as ProductActive, Entity as Products},
        users::{Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{Order, OrderItem, UserSummary},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::cart_service,
    state::AppState,
};

/// Copies a cart line into an order line. Name and image come from the product as it is
/// now; price and subtotal come from the cart line.
pub fn snapshot_item(item: &cart_items::Model, product: &products::Model) -> OrderItem {
    OrderItem {
        product_id: product.id,
        product_name: product.name.clone(),
        product_image: product.image_url.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
        subtotal: item.subtotal,
    }
}

pub fn order_total(items: &[OrderItem]) -> AppResult<i64> {
    items
        .iter()
        .try_fold(0_i64, |acc, item| acc.checked_add(item.subtotal))
        .ok_or_else(cart_service::amount_out_of_range)
}

pub fn stock_shortfall_message(product_name: &str, available: i32, requested: i32) -> String {
    format!(
        "Insufficient stock for {}. Available: {}, requested: {}",
        product_name, available, requested
    )
}

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;

    let cart = cart_service::find_cart(&txn, user.user_id).await?;
    // Serializes concurrent checkouts of the same cart.
    let cart = crate::entity::Carts::find_by_id(cart.id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let lines = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .all(&txn)
        .await?;

    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }

    // Lock products in id order so two checkouts sharing products cannot deadlock.
    let mut lock_order: Vec<&cart_items::Model> = lines.iter().collect();
    lock_order.sort_by_key(|line| line.product_id);

    let mut locked: HashMap<Uuid, products::Model> = HashMap::new();
    for (index, line) in lock_order.into_iter().enumerate() {
        let product = Products::find_by_id(line.product_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(format!("Item {} has no associated product", index + 1))
            })?;

        if product.stock < line.quantity {
            return Err(AppError::BadRequest(stock_shortfall_message(
                &product.name,
                product.stock,
                line.quantity,
            )));
        }

        let remaining = product.stock - line.quantity;
        let mut active: ProductActive = product.into();
        active.stock = Set(remaining);
        if remaining == 0 {
            active.status = Set(ProductStatus::OutOfStock);
        }
        active.updated_at = Set(Utc::now().into());
        let updated = active.update(&txn).await?;
        locked.insert(updated.id, updated);
    }

    let items: Vec<OrderItem> = lines
        .iter()
        .filter_map(|line| locked.get(&line.product_id).map(|p| snapshot_item(line, p)))
        .collect();
    let total = order_total(&items)?;

    let address = payload.shipping_address;
    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        total: Set(total),
        status: Set(OrderStatus::Pending),
        ship_street: Set(address.street.trim().to_string()),
        ship_city: Set(address.city.trim().to_string()),
        ship_postal_code: Set(address.postal_code.trim().to_string()),
        ship_country: Set(address.country.trim().to_string()),
        phone: Set(payload.phone.trim().to_string()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    for item in &items {
        OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            product_name: Set(item.product_name.clone()),
            product_image: Set(item.product_image.clone()),
            quantity: Set(item.quantity),
            unit_price: Set(item.unit_price),
            subtotal: Set(item.subtotal),
        }
        .insert(&txn)
        .await?;
    }

    cart_service::clear_lines(&txn, cart).await?;

    txn.commit().await?;

    tracing::info!(order_id = %order.id, total, lines = items.len(), "order created");
    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_create",
        "orders",
        serde_json::json!({ "order_id": order.id, "total": total }),
    )
    .await;

    let owner = user_summary(&state.orm, order.user_id).await?;
    Ok(ApiResponse::success(
        "Order created",
        OrderWithItems {
            order: Order::from(order),
            items,
            user: owner,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all();
    if !user.is_admin() {
        condition = condition.add(OrderCol::UserId.eq(user.user_id));
    }
    if let Some(status) = query.status {
        condition = condition.add(OrderCol::Status.eq(status));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let items = with_items_and_owners(&state.orm, orders).await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if !user.is_admin() && order.user_id != user.user_id {
        return Err(AppError::Forbidden);
    }

    let data = single_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success("Order", data, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let order = Orders::find_by_id(id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let from = order.status;
    let to = payload.status;
    if !from.can_transition_to(to) {
        return Err(AppError::BadRequest(format!(
            "Cannot change status from {} to {}",
            status_name(from),
            status_name(to)
        )));
    }

    let mut active: OrderActive = order.into();
    active.status = Set(to);
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "order_status_update",
        "orders",
        serde_json::json!({ "order_id": order.id, "from": from, "to": to }),
    )
    .await;

    let data = single_with_items(&state.orm, order).await?;
    Ok(ApiResponse::success(
        "Order status updated",
        data,
        Some(Meta::empty()),
    ))
}

fn status_name(status: OrderStatus) -> String {
    use sea_orm::ActiveEnum;
    status.to_value()
}

async fn user_summary<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<UserSummary> {
    let found = Users::find_by_id(user_id).one(conn).await?;
    Ok(found
        .as_ref()
        .map(UserSummary::from)
        .unwrap_or_else(|| UserSummary::missing(user_id)))
}

async fn single_with_items<C: ConnectionTrait>(
    conn: &C,
    order: orders::Model,
) -> AppResult<OrderWithItems> {
    let mut list = with_items_and_owners(conn, vec![order]).await?;
    list.pop().ok_or(AppError::NotFound)
}

async fn with_items_and_owners<C: ConnectionTrait>(
    conn: &C,
    orders: Vec<orders::Model>,
) -> AppResult<Vec<OrderWithItems>> {
    if orders.is_empty() {
        return Ok(Vec::new());
    }

    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let mut user_ids: Vec<Uuid> = orders.iter().map(|o| o.user_id).collect();
    user_ids.sort();
    user_ids.dedup();

    let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in OrderItems::find()
        .filter(OrderItemCol::OrderId.is_in(order_ids))
        .all(conn)
        .await?
    {
        items_by_order
            .entry(item.order_id)
            .or_default()
            .push(OrderItem::from(item));
    }

    let owners: HashMap<Uuid, UserSummary> = Users::find()
        .filter(UserCol::Id.is_in(user_ids))
        .all(conn)
        .await?
        .iter()
        .map(|u| (u.id, UserSummary::from(u)))
        .collect();

    let result = orders
        .into_iter()
        .map(|order| {
            let items = items_by_order.remove(&order.id).unwrap_or_default();
            let user = owners
                .get(&order.user_id)
                .cloned()
                .unwrap_or_else(|| UserSummary::missing(order.user_id));
            OrderWithItems {
                order: Order::from(order),
                items,
                user,
            }
        })
        .collect();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn now() -> sea_orm::prelude::DateTimeWithTimeZone {
        Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap())
    }

    fn product(name: &str, price: i64, stock: i32) -> products::Model {
        products::Model {
            id: Uuid::new_v4(),
            name: name.into(),
            description: "desc".into(),
            price,
            category: "misc".into(),
            stock,
            image_url: format!("https://img.example/{name}.png"),
            status: ProductStatus::Available,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn line(product: &products::Model, quantity: i32, unit_price: i64) -> cart_items::Model {
        cart_items::Model {
            id: Uuid::new_v4(),
            cart_id: Uuid::nil(),
            product_id: product.id,
            quantity,
            unit_price,
            subtotal: cart_service::line_subtotal(quantity, unit_price).unwrap(),
            created_at: now(),
        }
    }

    #[test]
    fn snapshot_keeps_cart_price_even_after_product_price_changes() {
        let mut mug = product("mug", 1_000, 5);
        let cart_line = line(&mug, 2, 1_000);
        mug.price = 9_999;

        let item = snapshot_item(&cart_line, &mug);
        assert_eq!(item.unit_price, 1_000);
        assert_eq!(item.subtotal, 2_000);
        assert_eq!(item.product_name, "mug");
        assert_eq!(item.product_image, "https://img.example/mug.png");
    }

    #[test]
    fn order_total_sums_snapshot_subtotals() {
        let mug = product("mug", 1_000, 5);
        let tee = product("tee", 2_500, 5);
        let items = vec![
            snapshot_item(&line(&mug, 2, 1_000), &mug),
            snapshot_item(&line(&tee, 1, 2_500), &tee),
        ];
        assert_eq!(order_total(&items).unwrap(), 4_500);
    }

    #[test]
    fn shortfall_message_names_product_and_quantities() {
        assert_eq!(
            stock_shortfall_message("mug", 1, 3),
            "Insufficient stock for mug. Available: 1, requested: 3"
        );
    }

    #[test]
    fn status_names_use_stored_values() {
        assert_eq!(status_name(OrderStatus::Pending), "pendiente");
        assert_eq!(status_name(OrderStatus::Delivered), "entregado");
    }
}
