use axum::{extract::FromRequestParts, http::header};
use sea_orm::EntityTrait;
use uuid::Uuid;

use crate::{
    entity::{
        Roles, Users,
        enums::{RoleName, UserStatus},
    },
    error::AppError,
    services::token_service::{decode_access_token, subject_id},
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: RoleName,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == RoleName::Admin
    }
}

pub fn ensure_role(user: &AuthUser, role: RoleName) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, RoleName::Admin)
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(value: &str) -> Result<&str, AppError> {
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Token not provided".into()))?;
    Ok(token)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Token not provided".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = bearer_token(auth_str)?;
        authenticate(state, token).await
    }
}

/// Resolves an access token to a live, active user.
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let claims = decode_access_token(&state.config, token)?;
    let user_id = subject_id(&claims.sub)?;

    // Roles and status can change after a token is issued, so trust the database.
    let (user, role) = Users::find_by_id(user_id)
        .find_also_related(Roles)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not authorized".into()))?;

    if user.status != UserStatus::Active {
        return Err(AppError::Unauthorized("User not authorized".into()));
    }
    let role = role.ok_or_else(|| AppError::Unauthorized("User not authorized".into()))?;

    Ok(AuthUser {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role: role.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: RoleName) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            name: "Ana".into(),
            email: "ana@example.com".into(),
            role,
        }
    }

    #[test]
    fn admin_gate() {
        assert!(ensure_admin(&user(RoleName::Admin)).is_ok());
        assert!(matches!(
            ensure_admin(&user(RoleName::Customer)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn bearer_scheme_is_required() {
        assert_eq!(bearer_token("Bearer abc.def").unwrap(), "abc.def");
        assert!(bearer_token("Basic abc").is_err());
        assert!(bearer_token("Bearer   ").is_err());
    }
}
