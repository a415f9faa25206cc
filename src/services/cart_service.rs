use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::cart::{AddCartItemRequest, UpdateCartItemRequest},
    entity::{
        cart_items::{self, ActiveModel as CartItemActive, Column as ItemCol, Entity as CartItems},
        carts::{self, ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Cart, CartItem},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub(crate) fn amount_out_of_range() -> AppError {
    AppError::BadRequest("Amount out of range".into())
}

pub fn line_subtotal(quantity: i32, unit_price: i64) -> AppResult<i64> {
    i64::from(quantity)
        .checked_mul(unit_price)
        .ok_or_else(amount_out_of_range)
}

pub fn cart_total(items: &[cart_items::Model]) -> AppResult<i64> {
    items
        .iter()
        .try_fold(0_i64, |acc, item| acc.checked_add(item.subtotal))
        .ok_or_else(amount_out_of_range)
}

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let cart = find_or_create_cart(&state.orm, user.user_id).await?;
    let view = load_cart(&state.orm, cart).await?;
    Ok(ApiResponse::success("Cart", view, Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddCartItemRequest,
) -> AppResult<ApiResponse<Cart>> {
    payload.validate()?;
    let quantity = payload.quantity.unwrap_or(1);

    let txn = state.orm.begin().await?;

    let product = Products::find_by_id(payload.product_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if product.stock < quantity {
        return Err(AppError::BadRequest("Insufficient stock".into()));
    }

    let cart = find_or_create_cart(&txn, user.user_id).await?;
    let existing = find_line(&txn, cart.id, product.id).await?;

    if let Some(item) = existing {
        let new_quantity = item
            .quantity
            .checked_add(quantity)
            .filter(|q| *q <= product.stock);
        let Some(new_quantity) = new_quantity else {
            return Err(AppError::BadRequest("Insufficient stock".into()));
        };
        let unit_price = item.unit_price;
        let mut active: CartItemActive = item.into();
        active.quantity = Set(new_quantity);
        active.subtotal = Set(line_subtotal(new_quantity, unit_price)?);
        active.update(&txn).await?;
    } else {
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(product.id),
            quantity: Set(quantity),
            unit_price: Set(product.price),
            subtotal: Set(line_subtotal(quantity, product.price)?),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
    }

    let cart = recalculate_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({ "product_id": product.id, "quantity": quantity }),
    )
    .await;

    let view = load_cart(&state.orm, cart).await?;
    Ok(ApiResponse::success("Item added", view, Some(Meta::empty())))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<Cart>> {
    payload.validate()?;

    let txn = state.orm.begin().await?;
    let cart = find_cart(&txn, user.user_id).await?;
    let item = find_line(&txn, cart.id, product_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let product = Products::find_by_id(product_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if payload.quantity > product.stock {
        return Err(AppError::BadRequest("Insufficient stock".into()));
    }

    // The line keeps the price captured when it was first added.
    let unit_price = item.unit_price;
    let mut active: CartItemActive = item.into();
    active.quantity = Set(payload.quantity);
    active.subtotal = Set(line_subtotal(payload.quantity, unit_price)?);
    active.update(&txn).await?;

    let cart = recalculate_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": product_id, "quantity": payload.quantity }),
    )
    .await;

    let view = load_cart(&state.orm, cart).await?;
    Ok(ApiResponse::success("Item updated", view, Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let cart = find_cart(&txn, user.user_id).await?;

    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(ItemCol::CartId.eq(cart.id))
                .add(ItemCol::ProductId.eq(product_id)),
        )
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    let cart = recalculate_total(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    let view = load_cart(&state.orm, cart).await?;
    Ok(ApiResponse::success("Removed from cart", view, Some(Meta::empty())))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Cart>> {
    let txn = state.orm.begin().await?;
    let cart = find_cart(&txn, user.user_id).await?;
    let cart = clear_lines(&txn, cart).await?;
    txn.commit().await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        "carts",
        serde_json::json!({ "cart_id": cart.id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Cart cleared",
        Cart::from_entity(cart, Vec::new()),
        Some(Meta::empty()),
    ))
}

pub async fn find_cart<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<carts::Model> {
    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)
}

async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> AppResult<carts::Model> {
    let existing = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(conn)
        .await?;
    if let Some(cart) = existing {
        return Ok(cart);
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total: Set(0),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(conn)
    .await?;
    Ok(cart)
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    product_id: Uuid,
) -> AppResult<Option<cart_items::Model>> {
    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(ItemCol::CartId.eq(cart_id))
                .add(ItemCol::ProductId.eq(product_id)),
        )
        .one(conn)
        .await?;
    Ok(item)
}

/// Deletes every line of `cart` and zeroes its total.
pub async fn clear_lines<C: ConnectionTrait>(
    conn: &C,
    cart: carts::Model,
) -> AppResult<carts::Model> {
    CartItems::delete_many()
        .filter(ItemCol::CartId.eq(cart.id))
        .exec(conn)
        .await?;

    let mut active: CartActive = cart.into();
    active.total = Set(0);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

async fn recalculate_total<C: ConnectionTrait>(
    conn: &C,
    cart: carts::Model,
) -> AppResult<carts::Model> {
    let items = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .all(conn)
        .await?;

    let mut active: CartActive = cart.into();
    active.total = Set(cart_total(&items)?);
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(conn).await?)
}

async fn load_cart<C: ConnectionTrait>(conn: &C, cart: carts::Model) -> AppResult<Cart> {
    let items = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .order_by_asc(ItemCol::CreatedAt)
        .find_also_related(Products)
        .all(conn)
        .await?
        .into_iter()
        .map(|(item, product)| CartItem::from_entity(item, product))
        .collect();
    Ok(Cart::from_entity(cart, items))
}
