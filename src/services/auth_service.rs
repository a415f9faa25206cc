use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use password_hash::rand_core::OsRng;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use sea_orm::ActiveValue::NotSet;
use uuid::Uuid;
use validator::Validate;

use crate::{
    audit,
    dto::auth::{AuthResponse, LoginRequest, RefreshTokenRequest, RegisterRequest},
    entity::{
        Roles,
        enums::{RoleName, UserStatus},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    models::User,
    response::{ApiResponse, Meta},
    services::{role_service, token_service},
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub async fn email_taken(state: &AppState, email: &str) -> AppResult<bool> {
    let exist = Users::find()
        .filter(UserCol::Email.eq(email))
        .one(&state.orm)
        .await?;
    Ok(exist.is_some())
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let RegisterRequest {
        name,
        email,
        password,
        phone,
        address,
    } = payload;
    let email = normalize_email(&email);

    if email_taken(state, &email).await? {
        return Err(AppError::BadRequest("Email is already registered".to_string()));
    }

    let role = role_service::role_by_name(&state.orm, RoleName::Customer).await?;
    let password_hash = hash_password(&password)?;

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.trim().to_string()),
        email: Set(email),
        password_hash: Set(password_hash),
        phone: Set(phone),
        address: Set(address),
        role_id: Set(role.id),
        status: Set(UserStatus::Active),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let tokens = token_service::issue_pair(&state.config, user.id, role.name, &user.name)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = AuthResponse {
        user: User::from_entity(user, Some(&role)),
        token: tokens.token,
        refresh_token: tokens.refresh_token,
    };
    Ok(ApiResponse::success("User registered", resp, Some(Meta::empty())))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let email = normalize_email(&payload.email);

    let found = Users::find()
        .filter(UserCol::Email.eq(email))
        .find_also_related(Roles)
        .one(&state.orm)
        .await?;

    let (user, role) = match found {
        Some((user, Some(role))) => (user, role),
        _ => return Err(AppError::BadRequest("Invalid credentials".into())),
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::BadRequest("Invalid credentials".into()));
    }

    if user.status != UserStatus::Active {
        return Err(AppError::Unauthorized("User is inactive".into()));
    }

    let tokens = token_service::issue_pair(&state.config, user.id, role.name, &user.name)?;

    audit::record(
        &state.pool,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    let resp = AuthResponse {
        user: User::from_entity(user, Some(&role)),
        token: tokens.token,
        refresh_token: tokens.refresh_token,
    };
    Ok(ApiResponse::success("Logged in", resp, Some(Meta::empty())))
}

pub async fn refresh_token(
    state: &AppState,
    payload: RefreshTokenRequest,
) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;
    let claims = token_service::decode_refresh_token(&state.config, &payload.refresh_token)?;
    let user_id = token_service::subject_id(&claims.sub)?;

    let found = Users::find_by_id(user_id)
        .find_also_related(Roles)
        .one(&state.orm)
        .await?;
    let (user, role) = match found {
        Some((user, Some(role))) => (user, role),
        _ => return Err(AppError::Unauthorized("User not found".into())),
    };

    if user.status != UserStatus::Active {
        return Err(AppError::Unauthorized("User is inactive".into()));
    }

    let tokens = token_service::issue_pair(&state.config, user.id, role.name, &user.name)?;
    let resp = AuthResponse {
        user: User::from_entity(user, Some(&role)),
        token: tokens.token,
        refresh_token: tokens.refresh_token,
    };
    Ok(ApiResponse::success("Token refreshed", resp, Some(Meta::empty())))
}
