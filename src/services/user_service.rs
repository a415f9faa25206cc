use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::users::{CreateUserRequest, OrderStats, StatsResponse, UpdateUserRequest, UserList},
    entity::{
        Products, Roles,
        enums::{RoleName, UserStatus},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::User,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    services::{
        auth_service::{email_taken, hash_password, normalize_email},
        role_service,
    },
    state::AppState,
};

pub async fn list_users(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let finder = Users::find()
        .filter(UserCol::Id.ne(user.user_id))
        .order_by_desc(UserCol::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .find_also_related(Roles)
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|(u, role)| User::from_entity(u, role.as_ref()))
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success("Users", UserList { items }, Some(meta)))
}

pub async fn get_user(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    let found = load_user(state, id).await?;
    Ok(ApiResponse::success("User", found, Some(Meta::empty())))
}

pub async fn profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let found = load_user(state, user.user_id).await?;
    Ok(ApiResponse::success("Profile", found, Some(Meta::empty())))
}

pub async fn create_user(
    state: &AppState,
    user: &AuthUser,
    payload: CreateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    payload.validate()?;

    let email = normalize_email(&payload.email);
    if email_taken(state, &email).await? {
        return Err(AppError::BadRequest("Email is already registered".to_string()));
    }

    let role = role_service::role_or_default(&state.orm, payload.role_id).await?;
    let created = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name.trim().to_string()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        phone: Set(payload.phone),
        address: Set(None),
        role_id: Set(role.id),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_create",
        "users",
        serde_json::json!({ "user_id": created.id, "role": role.name }),
    )
    .await;

    Ok(ApiResponse::success(
        "User created",
        User::from_entity(created, Some(&role)),
        Some(Meta::empty()),
    ))
}

pub async fn update_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateUserRequest,
) -> AppResult<ApiResponse<User>> {
    ensure_admin(user)?;
    payload.validate()?;

    let existing = Users::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: UserActive = existing.into();
    if let Some(name) = payload.name {
        active.name = Set(name.trim().to_string());
    }
    if let Some(email) = payload.email {
        active.email = Set(normalize_email(&email));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(Some(phone));
    }
    if let Some(status) = payload.status {
        active.status = Set(status);
    }
    // Unknown role ids are ignored rather than rejected.
    if let Some(role_id) = payload.role_id {
        if Roles::find_by_id(role_id).one(&state.orm).await?.is_some() {
            active.role_id = Set(role_id);
        }
    }
    active.updated_at = Set(Utc::now().into());
    let updated = active.update(&state.orm).await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_update",
        "users",
        serde_json::json!({ "user_id": updated.id, "status": updated.status }),
    )
    .await;

    let found = load_user(state, updated.id).await?;
    Ok(ApiResponse::success("User updated", found, Some(Meta::empty())))
}

pub async fn delete_user(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    if id == user.user_id {
        return Err(AppError::BadRequest("You cannot delete your own account".into()));
    }

    let result = Users::delete_by_id(id).exec(&state.orm).await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        Some(user.user_id),
        "user_delete",
        "users",
        serde_json::json!({ "user_id": id }),
    )
    .await;

    Ok(ApiResponse::success(
        "User deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<StatsResponse>> {
    ensure_admin(user)?;
    let products = Products::find().count(&state.orm).await? as i64;
    let users = Users::find().count(&state.orm).await? as i64;

    let (total_sales, order_count, average_sale, max_sale, min_sale): (
        i64,
        i64,
        Option<f64>,
        Option<i64>,
        Option<i64>,
    ) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(total), 0)::BIGINT,
               COUNT(*)::BIGINT,
               AVG(total)::FLOAT8,
               MAX(total),
               MIN(total)
        FROM orders
        WHERE status = 'entregado'
        "#,
    )
    .fetch_one(&state.pool)
    .await?;

    let data = StatsResponse {
        products,
        users,
        order_stats: OrderStats {
            total_sales,
            order_count,
            average_sale,
            max_sale,
            min_sale,
        },
    };
    Ok(ApiResponse::success("Stats", data, Some(Meta::empty())))
}

/// Creates the configured admin account when no user holds the admin role.
pub async fn ensure_default_admin(state: &AppState) -> AppResult<()> {
    let admin_role = role_service::role_by_name(&state.orm, RoleName::Admin).await?;
    let existing = Users::find()
        .filter(UserCol::RoleId.eq(admin_role.id))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let email = normalize_email(&state.config.admin_email);
    if email_taken(state, &email).await? {
        tracing::warn!(email = %email, "admin email belongs to a non-admin user, skipping");
        return Ok(());
    }

    UserActive {
        id: Set(Uuid::new_v4()),
        name: Set("Administrator".to_string()),
        email: Set(email.clone()),
        password_hash: Set(hash_password(&state.config.admin_password)?),
        phone: Set(Some("0000000000".to_string())),
        address: Set(None),
        role_id: Set(admin_role.id),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    tracing::info!(email = %email, "default admin created");
    Ok(())
}

async fn load_user(state: &AppState, id: Uuid) -> AppResult<User> {
    let (found, role) = Users::find_by_id(id)
        .find_also_related(Roles)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(User::from_entity(found, role.as_ref()))
}
