mod common;

use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use storefront_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        auth::{LoginRequest, RefreshTokenRequest, RegisterRequest},
        cart::{AddCartItemRequest, UpdateCartItemRequest},
        messages::SendMessageRequest,
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
        products::{CreateProductRequest, UpdateProductRequest},
        users::{CreateUserRequest, UpdateUserRequest},
    },
    entity::{
        Products,
        enums::{OrderStatus, ProductStatus, RoleName, UserStatus},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    middleware::auth::AuthUser,
    models::{Product, ShippingAddress},
    presence::ServerEvent,
    routes::params::{OrderListQuery, Pagination},
    services::{
        auth_service::{self, hash_password},
        cart_service, message_service, order_service, product_service, role_service,
        user_service,
    },
    state::AppState,
};
use uuid::Uuid;

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;
    role_service::ensure_default_roles(&orm).await?;
    Ok(AppState::new(pool, orm, common::test_config(database_url)))
}

async fn insert_user(state: &AppState, role: RoleName) -> anyhow::Result<AuthUser> {
    let role_row = role_service::role_by_name(&state.orm, role).await?;
    let email = format!("{}@flow.test", Uuid::new_v4());
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Flow User".into()),
        email: Set(email.clone()),
        password_hash: Set(hash_password("secret123")?),
        phone: Set(None),
        address: Set(None),
        role_id: Set(role_row.id),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(AuthUser {
        user_id: user.id,
        name: user.name,
        email,
        role,
    })
}

async fn create_product(
    state: &AppState,
    admin: &AuthUser,
    name: &str,
    price: i64,
    stock: i32,
) -> anyhow::Result<Product> {
    let resp = product_service::create_product(
        state,
        admin,
        CreateProductRequest {
            name: format!("{name} {}", Uuid::new_v4()),
            description: "flow test product".into(),
            price,
            category: "tests".into(),
            stock,
            image_url: None,
            status: None,
        },
    )
    .await?;
    Ok(resp.data.expect("product"))
}

async fn add(state: &AppState, user: &AuthUser, product: &Product, quantity: i32) -> anyhow::Result<i64> {
    let resp = cart_service::add_item(
        state,
        user,
        AddCartItemRequest {
            product_id: product.id,
            quantity: Some(quantity),
        },
    )
    .await?;
    Ok(resp.data.expect("cart").total)
}

fn order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        shipping_address: ShippingAddress {
            street: "Av. Siempre Viva 742".into(),
            city: "Springfield".into(),
            postal_code: "1000".into(),
            country: "AR".into(),
        },
        phone: "555-0100".into(),
    }
}

async fn stock_of(state: &AppState, id: Uuid) -> anyhow::Result<(i32, ProductStatus)> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .expect("product exists");
    Ok((product.stock, product.status))
}

// Integration flow: cart -> checkout -> status changes, against a real database.
#[tokio::test]
async fn cart_checkout_and_status_flow() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;
    let stranger = insert_user(&state, RoleName::Customer).await?;

    let mug = create_product(&state, &admin, "Mug", 1_000, 3).await?;
    let tee = create_product(&state, &admin, "Tee", 2_500, 5).await?;

    assert_eq!(add(&state, &customer, &mug, 2).await?, 2_000);
    assert_eq!(add(&state, &customer, &tee, 1).await?, 4_500);

    // Merging past available stock is refused.
    let err = add(&state, &customer, &mug, 2).await.unwrap_err();
    assert!(matches!(err.downcast_ref::<AppError>(), Some(AppError::BadRequest(_))));

    let cart = cart_service::update_item(
        &state,
        &customer,
        mug.id,
        UpdateCartItemRequest { quantity: 3 },
    )
    .await?
    .data
    .expect("cart");
    assert_eq!(cart.total, 3 * 1_000 + 2_500);

    let created = order_service::create_order(&state, &customer, order_request())
        .await?
        .data
        .expect("order");
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.order.total, 5_500);
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.user.id, customer.user_id);

    assert_eq!(stock_of(&state, mug.id).await?, (0, ProductStatus::OutOfStock));
    assert_eq!(stock_of(&state, tee.id).await?, (4, ProductStatus::Available));

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total, 0);

    // Empty cart cannot be checked out.
    let err = order_service::create_order(&state, &customer, order_request())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg == "Cart is empty"));

    // Ownership checks.
    let err = order_service::get_order(&state, &stranger, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));
    let own = order_service::list_orders(&state, &stranger, OrderListQuery::default())
        .await?
        .data
        .expect("orders");
    assert!(own.items.iter().all(|o| o.order.user_id == stranger.user_id));

    // Status machine.
    let skip = order_service::update_order_status(
        &state,
        &admin,
        created.order.id,
        UpdateOrderStatusRequest { status: OrderStatus::Delivered },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        skip,
        AppError::BadRequest(ref msg) if msg == "Cannot change status from pendiente to entregado"
    ));

    let err = order_service::update_order_status(
        &state,
        &customer,
        created.order.id,
        UpdateOrderStatusRequest { status: OrderStatus::Cancelled },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    for next in [OrderStatus::InProduction, OrderStatus::Shipping, OrderStatus::Delivered] {
        let updated = order_service::update_order_status(
            &state,
            &admin,
            created.order.id,
            UpdateOrderStatusRequest { status: next },
        )
        .await?
        .data
        .expect("order");
        assert_eq!(updated.order.status, next);
    }

    let err = order_service::update_order_status(
        &state,
        &admin,
        created.order.id,
        UpdateOrderStatusRequest { status: OrderStatus::Cancelled },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

#[tokio::test]
async fn shortfall_rolls_back_every_decrement() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;

    let plenty = create_product(&state, &admin, "Plenty", 500, 10).await?;
    let scarce = create_product(&state, &admin, "Scarce", 700, 2).await?;

    add(&state, &customer, &plenty, 4).await?;
    add(&state, &customer, &scarce, 2).await?;

    // Stock drops after the items were carted.
    product_service::update_product(
        &state,
        &admin,
        scarce.id,
        UpdateProductRequest {
            stock: Some(1),
            ..Default::default()
        },
    )
    .await?;

    let err = order_service::create_order(&state, &customer, order_request())
        .await
        .unwrap_err();
    match err {
        AppError::BadRequest(msg) => {
            assert!(msg.starts_with("Insufficient stock for Scarce"), "{msg}");
            assert!(msg.ends_with("Available: 1, requested: 2"), "{msg}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(stock_of(&state, plenty.id).await?.0, 10);
    assert_eq!(stock_of(&state, scarce.id).await?.0, 1);

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert_eq!(cart.items.len(), 2);

    Ok(())
}

#[tokio::test]
async fn duplicate_email_registration_is_rejected() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let email = format!("{}@Flow.Test", Uuid::new_v4());
    let request = |email: &str| RegisterRequest {
        name: "Ana".into(),
        email: email.to_string(),
        password: "secret123".into(),
        phone: None,
        address: None,
    };

    let first = auth_service::register_user(&state, request(&email))
        .await?
        .data
        .expect("auth");
    assert_eq!(first.user.email, email.to_lowercase());
    assert_eq!(first.user.role, Some(RoleName::Customer));

    let err = auth_service::register_user(&state, request(&email.to_uppercase()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::BadRequest(ref msg) if msg == "Email is already registered"
    ));

    Ok(())
}

#[tokio::test]
async fn cart_lines_can_be_removed_and_cleared() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;
    let pen = create_product(&state, &admin, "Pen", 150, 4).await?;
    let pad = create_product(&state, &admin, "Pad", 400, 4).await?;

    add(&state, &customer, &pen, 2).await?;
    assert_eq!(add(&state, &customer, &pad, 1).await?, 700);

    let err = cart_service::update_item(
        &state,
        &customer,
        pen.id,
        UpdateCartItemRequest { quantity: 5 },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg == "Insufficient stock"));

    let cart = cart_service::remove_item(&state, &customer, pen.id)
        .await?
        .data
        .expect("cart");
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.total, 400);

    let err = cart_service::remove_item(&state, &customer, pen.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    let err = cart_service::update_item(
        &state,
        &customer,
        pen.id,
        UpdateCartItemRequest { quantity: 1 },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let cart = cart_service::clear_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());
    assert_eq!(cart.total, 0);

    let cart = cart_service::get_cart(&state, &customer).await?.data.expect("cart");
    assert!(cart.items.is_empty());

    Ok(())
}

#[tokio::test]
async fn admin_manages_users_and_reads_stats() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;

    let err = user_service::list_users(&state, &customer, Pagination::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let email = format!("{}@Managed.Test", Uuid::new_v4());
    let created = user_service::create_user(
        &state,
        &admin,
        CreateUserRequest {
            name: " Managed ".into(),
            email: email.clone(),
            password: "secret123".into(),
            phone: Some("555-0199".into()),
            role_id: Some(Uuid::new_v4()),
        },
    )
    .await?
    .data
    .expect("user");
    assert_eq!(created.name, "Managed");
    assert_eq!(created.email, email.to_lowercase());
    assert_eq!(created.role, Some(RoleName::Customer));

    let listed = user_service::list_users(
        &state,
        &admin,
        Pagination {
            page: Some(1),
            per_page: Some(100),
        },
    )
    .await?;
    let items = listed.data.expect("users").items;
    assert!(items.iter().all(|u| u.id != admin.user_id));
    assert!(listed.meta.and_then(|m| m.total).unwrap_or(0) >= 2);

    let updated = user_service::update_user(
        &state,
        &admin,
        created.id,
        UpdateUserRequest {
            status: Some(UserStatus::Inactive),
            role_id: Some(Uuid::new_v4()),
            ..Default::default()
        },
    )
    .await?
    .data
    .expect("user");
    assert_eq!(updated.status, UserStatus::Inactive);
    assert_eq!(updated.role, Some(RoleName::Customer));

    let fetched = user_service::get_user(&state, &admin, created.id)
        .await?
        .data
        .expect("user");
    assert_eq!(fetched.status, UserStatus::Inactive);

    let me = user_service::profile(&state, &customer).await?.data.expect("profile");
    assert_eq!(me.id, customer.user_id);

    let err = user_service::delete_user(&state, &admin, admin.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    user_service::delete_user(&state, &admin, created.id).await?;
    let err = user_service::get_user(&state, &admin, created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
    let err = user_service::delete_user(&state, &admin, created.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    // Delivered orders feed the sales aggregate. Other tests may deliver
    // orders concurrently, so only lower bounds are checked.
    let before = user_service::stats(&state, &admin)
        .await?
        .data
        .expect("stats")
        .order_stats;

    let lamp = create_product(&state, &admin, "Lamp", 3_300, 2).await?;
    add(&state, &customer, &lamp, 1).await?;
    let order = order_service::create_order(&state, &customer, order_request())
        .await?
        .data
        .expect("order");
    for next in [OrderStatus::InProduction, OrderStatus::Shipping, OrderStatus::Delivered] {
        order_service::update_order_status(
            &state,
            &admin,
            order.order.id,
            UpdateOrderStatusRequest { status: next },
        )
        .await?;
    }

    let stats = user_service::stats(&state, &admin).await?.data.expect("stats");
    assert!(stats.products >= 1);
    assert!(stats.users >= 2);
    assert!(stats.order_stats.order_count > before.order_count);
    assert!(stats.order_stats.total_sales >= before.total_sales + 3_300);
    assert!(stats.order_stats.max_sale.is_some_and(|max| max >= 3_300));
    assert!(stats.order_stats.average_sale.is_some());

    let err = user_service::stats(&state, &customer).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

#[tokio::test]
async fn messages_are_stored_and_pushed_to_online_receivers() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let sender = insert_user(&state, RoleName::Admin).await?;
    let receiver = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;

    let peers = message_service::chat_users(&state, &sender)
        .await?
        .data
        .expect("users")
        .items;
    assert!(peers.iter().any(|u| u.id == receiver.user_id));
    assert!(peers.iter().all(|u| u.id != sender.user_id));
    assert!(peers.iter().all(|u| u.id != customer.user_id));

    let err = message_service::send_message(
        &state,
        &sender,
        receiver.user_id,
        SendMessageRequest {
            text: Some("   ".into()),
            image: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = message_service::send_message(
        &state,
        &sender,
        Uuid::new_v4(),
        SendMessageRequest {
            text: Some("hola".into()),
            image: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound));

    let (connection, mut events) = state.presence.connect().await;
    state.presence.register(receiver.user_id, connection).await;
    while events.try_recv().is_ok() {}

    let sent = message_service::send_message(
        &state,
        &sender,
        receiver.user_id,
        SendMessageRequest {
            text: Some("  hola  ".into()),
            image: None,
        },
    )
    .await?
    .data
    .expect("message");
    assert_eq!(sent.text, "hola");
    assert_eq!(sent.sender_id, sender.user_id);

    match events.try_recv() {
        Ok(ServerEvent::ReceiveMessage(pushed)) => assert_eq!(pushed.id, sent.id),
        other => panic!("expected a pushed message, got {other:?}"),
    }

    message_service::send_message(
        &state,
        &receiver,
        sender.user_id,
        SendMessageRequest {
            text: None,
            image: Some("https://img.example/reply.png".into()),
        },
    )
    .await?;

    let thread = message_service::conversation(&state, &sender, receiver.user_id)
        .await?
        .data
        .expect("messages")
        .items;
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].id, sent.id);
    assert_eq!(thread[1].image, "https://img.example/reply.png");

    let err = message_service::conversation(&state, &customer, sender.user_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}

#[tokio::test]
async fn login_refresh_and_inactive_accounts() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let customer = insert_user(&state, RoleName::Customer).await?;

    let login = |email: &str, password: &str| LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    };

    let err = auth_service::login_user(&state, login(&customer.email, "wrong-pass"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref msg) if msg == "Invalid credentials"));

    let session = auth_service::login_user(&state, login(&customer.email.to_uppercase(), "secret123"))
        .await?
        .data
        .expect("auth");
    assert_eq!(session.user.id, customer.user_id);

    let refreshed = auth_service::refresh_token(
        &state,
        RefreshTokenRequest {
            refresh_token: session.refresh_token.clone(),
        },
    )
    .await?
    .data
    .expect("auth");
    assert_eq!(refreshed.user.id, customer.user_id);
    assert!(!refreshed.token.is_empty());

    // An access token is not accepted as a refresh token.
    let err = auth_service::refresh_token(
        &state,
        RefreshTokenRequest {
            refresh_token: session.token,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    user_service::update_user(
        &state,
        &admin,
        customer.user_id,
        UpdateUserRequest {
            status: Some(UserStatus::Inactive),
            ..Default::default()
        },
    )
    .await?;

    let err = auth_service::login_user(&state, login(&customer.email, "secret123"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(ref msg) if msg == "User is inactive"));

    let err = auth_service::refresh_token(
        &state,
        RefreshTokenRequest {
            refresh_token: session.refresh_token,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    Ok(())
}

#[tokio::test]
async fn default_roles_are_seeded_once() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url).await?;

    role_service::ensure_default_roles(&state.orm).await?;
    role_service::ensure_default_roles(&state.orm).await?;

    let admin = insert_user(&state, RoleName::Admin).await?;
    let roles = role_service::list_roles(&state, &admin).await?.data.expect("roles");
    for name in [RoleName::Admin, RoleName::Customer] {
        assert_eq!(roles.iter().filter(|r| r.name == name).count(), 1, "{name:?}");
    }

    let customer = insert_user(&state, RoleName::Customer).await?;
    let err = role_service::list_roles(&state, &customer).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    Ok(())
}
