use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use crate::api::server::AppState;
use crate::auth::token::{Identity, TokenIssuer};
use crate::db::schema::ADMIN_ROLE;
use crate::error::AppError;

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// No token is a 401; a token that fails verification is a 403.
pub fn authenticate(headers: &HeaderMap, tokens: &TokenIssuer) -> Result<Identity, AppError> {
    let token = bearer_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Access token required".to_string()))?;

    let identity = tokens
        .verify(token)
        .map_err(|_| AppError::Forbidden("Invalid or expired token".to_string()))?;
    debug!(user_id = identity.user_id, username = %identity.username, "authenticated");
    Ok(identity)
}

pub fn check_role(identity: &Identity, required: &str) -> Result<(), AppError> {
    if identity.roles.is_empty() {
        warn!(user_id = identity.user_id, "forbidden, no roles assigned");
        return Err(AppError::Forbidden("Forbidden: No roles assigned".to_string()));
    }
    if !identity.has_role(required) {
        warn!(user_id = identity.user_id, required, "forbidden, missing role");
        return Err(AppError::Forbidden(format!("Forbidden: '{required}' role required")));
    }
    Ok(())
}

/// Extracts the caller's identity from the bearer token.
pub struct AuthUser(pub Identity);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, &state.tokens).map(AuthUser)
    }
}

pub trait RequiredRole {
    const NAME: &'static str;
}

pub struct Admin;

impl RequiredRole for Admin {
    const NAME: &'static str = ADMIN_ROLE;
}

/// Like [`AuthUser`], but also demands that the caller holds role `R`.
pub struct RequireRole<R>(pub Identity, pub PhantomData<R>);

impl<R> FromRequestParts<Arc<AppState>> for RequireRole<R>
where
    R: RequiredRole + Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(identity) = AuthUser::from_request_parts(parts, state).await?;
        check_role(&identity, R::NAME)?;
        Ok(RequireRole(identity, PhantomData))
    }
}
