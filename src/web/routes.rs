use super::handlers;
use super::state::AppState;
use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/posts",
            get(handlers::api::list_posts).post(handlers::api::create_post),
        )
        .route("/api/posts/published", get(handlers::api::published_posts))
        .route("/api/posts/drafts", get(handlers::api::draft_posts))
        .route("/api/posts/tags", get(handlers::api::list_tags))
        .route(
            "/api/posts/:slug",
            get(handlers::api::get_post)
                .put(handlers::api::update_post)
                .patch(handlers::api::update_post)
                .delete(handlers::api::delete_post),
        )
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/user", get(handlers::auth::user_info))
        .route("/api/auth/logout", post(handlers::auth::logout))
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let site = &state.config.site;
    Json(serde_json::json!({
        "status": "ok",
        "site": { "title": site.title, "description": site.description },
    }))
}
