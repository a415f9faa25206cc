use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, Iterable, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;

use crate::{
    entity::{
        enums::RoleName,
        roles::{ActiveModel as RoleActive, Column as RoleCol, Entity as Roles, Model as RoleModel},
    },
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::Role,
    response::{ApiResponse, Meta},
    state::AppState,
};

pub async fn list_roles(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<Vec<Role>>> {
    ensure_admin(user)?;
    let roles = Roles::find()
        .order_by_asc(RoleCol::Name)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Role::from)
        .collect();

    Ok(ApiResponse::success("Roles", roles, Some(Meta::empty())))
}

/// Seeds every known role when the table is empty.
pub async fn ensure_default_roles(orm: &DatabaseConnection) -> AppResult<()> {
    if Roles::find().count(orm).await? > 0 {
        return Ok(());
    }

    for name in RoleName::iter() {
        insert_role(orm, name).await?;
    }
    tracing::info!("default roles created");
    Ok(())
}

/// Looks a role up by name, creating it when missing.
pub async fn role_by_name(orm: &DatabaseConnection, name: RoleName) -> AppResult<RoleModel> {
    let existing = Roles::find()
        .filter(RoleCol::Name.eq(name))
        .one(orm)
        .await?;
    match existing {
        Some(role) => Ok(role),
        None => insert_role(orm, name).await,
    }
}

/// Resolves an optional role id, falling back to the customer role when the id is
/// absent or unknown.
pub async fn role_or_default(
    orm: &DatabaseConnection,
    role_id: Option<Uuid>,
) -> AppResult<RoleModel> {
    if let Some(id) = role_id {
        if let Some(role) = Roles::find_by_id(id).one(orm).await? {
            return Ok(role);
        }
    }
    role_by_name(orm, RoleName::Customer).await
}

async fn insert_role(orm: &DatabaseConnection, name: RoleName) -> AppResult<RoleModel> {
    let role = RoleActive {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(Some(name.description().to_string())),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;
    Ok(role)
}
