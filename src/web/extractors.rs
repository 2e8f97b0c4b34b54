use crate::models::User;
use crate::services::auth;
use crate::web::error::ApiError;
use crate::web::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Token from `Authorization: Token <key>` or `Authorization: Bearer <key>`.
fn request_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if token.is_empty()
        || !(scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer"))
    {
        return None;
    }
    Some(token.to_string())
}

fn require_user(state: &AppState, token: Option<String>) -> Result<(User, String), ApiError> {
    let token = token.ok_or_else(|| {
        ApiError::Unauthorized("Authentication credentials were not provided".to_string())
    })?;
    let user = auth::validate_token(&state.db, &token)?
        .ok_or_else(|| ApiError::Unauthorized("Invalid token".to_string()))?;
    Ok((user, token))
}

fn require_staff(state: &AppState, token: Option<String>) -> Result<StaffUser, ApiError> {
    let (user, _) = require_user(state, token)?;
    if !user.is_staff {
        return Err(ApiError::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ));
    }
    Ok(StaffUser(user))
}

fn optional_user(state: &AppState, token: Option<String>) -> Result<OptionalUser, ApiError> {
    let user = match token {
        Some(t) => auth::validate_token(&state.db, &t)?,
        None => None,
    };
    Ok(OptionalUser(user))
}

/// An authenticated caller, with the token it presented.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let token = request_token(parts);
        Box::pin(async move {
            require_user(&state, token).map(|(user, token)| AuthUser { user, token })
        })
    }
}

/// Staff-only access: 401 without a valid token, 403 for regular users.
pub struct StaffUser(pub User);

impl FromRequestParts<Arc<AppState>> for StaffUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let token = request_token(parts);
        Box::pin(async move { require_staff(&state, token) })
    }
}

/// The caller if a valid token was sent; anonymous otherwise.
pub struct OptionalUser(pub Option<User>);

impl OptionalUser {
    pub fn is_staff(&self) -> bool {
        self.0.as_ref().map(|u| u.is_staff).unwrap_or(false)
    }
}

impl FromRequestParts<Arc<AppState>> for OptionalUser {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> Pin<Box<dyn Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>>
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        let state = state.clone();
        let token = request_token(parts);
        Box::pin(async move { optional_user(&state, token) })
    }
}
