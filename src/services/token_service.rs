use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dto::auth::{Claims, RefreshClaims},
    entity::enums::RoleName,
    error::{AppError, AppResult},
};

pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

fn expiry(duration: Duration) -> AppResult<usize> {
    let expiration = Utc::now()
        .checked_add_signed(duration)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;
    Ok(expiration.timestamp() as usize)
}

pub fn issue_access_token(
    config: &AppConfig,
    user_id: Uuid,
    role: RoleName,
    name: &str,
) -> AppResult<String> {
    let claims = Claims {
        sub: user_id.to_string(),
        role,
        name: name.to_string(),
        exp: expiry(Duration::hours(config.jwt_expire_hours))?,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn issue_refresh_token(config: &AppConfig, user_id: Uuid) -> AppResult<String> {
    let claims = RefreshClaims {
        sub: user_id.to_string(),
        exp: expiry(Duration::days(config.jwt_refresh_expire_days))?,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn issue_pair(
    config: &AppConfig,
    user_id: Uuid,
    role: RoleName,
    name: &str,
) -> AppResult<TokenPair> {
    Ok(TokenPair {
        token: issue_access_token(config, user_id, role, name)?,
        refresh_token: issue_refresh_token(config, user_id)?,
    })
}

pub fn decode_access_token(config: &AppConfig, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
}

pub fn decode_refresh_token(config: &AppConfig, token: &str) -> AppResult<RefreshClaims> {
    decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired refresh token".into()))
}

pub fn subject_id(sub: &str) -> AppResult<Uuid> {
    Uuid::parse_str(sub).map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))
}
