use crate::models::{CreateUser, User};
use crate::services::auth;
use crate::web::error::{ApiError, ApiResult};
use crate::web::extractors::AuthUser;
use crate::web::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize)]
pub struct TokenResponse {
    token: String,
    user: User,
}

#[derive(Serialize)]
pub struct MessageResponse {
    message: &'static str,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(form): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let (username, password) = match (form.username, form.password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => (u.trim().to_string(), p),
        _ => {
            return Err(ApiError::BadRequest(
                "Please provide both username and password".to_string(),
            ))
        }
    };

    if !state.login_limiter.check(&username) {
        tracing::warn!("Login rate limit hit for '{}'", username);
        return Err(ApiError::TooManyRequests(
            "Too many failed login attempts. Try again later.".to_string(),
        ));
    }

    match auth::authenticate(&state.db, &username, &password)? {
        Some(user) => {
            state.login_limiter.clear(&username);
            let token = auth::issue_token(&state.db, user.id)?;
            tracing::info!("User '{}' logged in", user.username);
            Ok(Json(TokenResponse { token, user }))
        }
        None => {
            state.login_limiter.record_failure(&username);
            tracing::warn!("Failed login for '{}'", username);
            Err(ApiError::Unauthorized("Invalid credentials".to_string()))
        }
    }
}

/// POST /api/auth/register
///
/// Self-registered accounts are never staff.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(form): Json<CreateUser>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let username = form.username.trim();
    let user_id = auth::create_user(&state.db, username, form.email.trim(), &form.password, false)?;
    let user = auth::get_user(&state.db, user_id)?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {} vanished after insert", user_id)))?;
    let token = auth::issue_token(&state.db, user.id)?;
    tracing::info!("Registered user '{}'", user.username);
    Ok((StatusCode::CREATED, Json(TokenResponse { token, user })))
}

/// GET /api/auth/user
pub async fn user_info(session: AuthUser) -> Json<User> {
    Json(session.user)
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    session: AuthUser,
) -> ApiResult<Json<MessageResponse>> {
    auth::revoke_token(&state.db, &session.token)?;
    Ok(Json(MessageResponse {
        message: "Successfully logged out",
    }))
}
