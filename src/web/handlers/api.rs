use crate::models::{CreatePost, PostFilter, PostView, UpdatePost};
use crate::services::posts;
use crate::services::tags::split_tags;
use crate::web::error::{ApiError, ApiResult};
use crate::web::extractors::{OptionalUser, StaffUser};
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub search: Option<String>,
    /// Comma-separated; a post matches if it carries any of them.
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListParams {
    /// Malformed dates and unknown orderings are ignored rather than rejected.
    fn filter(&self, published: Option<bool>) -> PostFilter {
        PostFilter {
            published,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
            tags: self
                .tags
                .as_deref()
                .map(|raw| split_tags(raw).map(String::from).collect())
                .unwrap_or_default(),
            start_date: self.start_date.as_deref().and_then(parse_date),
            end_date: self.end_date.as_deref().and_then(parse_date),
            ordering: self
                .ordering
                .as_deref()
                .and_then(|o| o.parse().ok())
                .unwrap_or_default(),
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: usize,
    pub per_page: usize,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<PageMeta>,
}

fn paginate(
    page: Option<usize>,
    per_page: Option<usize>,
    default_size: usize,
    max_size: usize,
) -> (usize, usize, usize) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default_size).min(max_size).max(1);
    let offset = (page - 1) * per_page;
    (page, per_page, offset)
}

fn json_envelope<T>(data: T, total: i64, page: usize, per_page: usize) -> Json<Envelope<T>> {
    Json(Envelope {
        data,
        meta: Some(PageMeta {
            total,
            page,
            per_page,
        }),
    })
}

fn json_single<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope { data, meta: None })
}

fn page_of_posts(
    state: &AppState,
    params: &ListParams,
    published: Option<bool>,
) -> ApiResult<Json<Envelope<Vec<PostView>>>> {
    let (page, per_page, offset) = paginate(
        params.page,
        params.per_page,
        state.config.posts.per_page,
        state.config.posts.max_per_page,
    );
    let filter = params.filter(published);
    let total = posts::count_posts(&state.db, &filter)?;
    let items = posts::list_posts(&state.db, &filter, per_page, offset)?
        .into_iter()
        .map(PostView::from)
        .collect();
    Ok(json_envelope(items, total, page, per_page))
}

/// GET /api/posts
pub async fn list_posts(
    State(state): State<Arc<AppState>>,
    viewer: OptionalUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Envelope<Vec<PostView>>>> {
    let published = if viewer.is_staff() { None } else { Some(true) };
    page_of_posts(&state, &params, published)
}

/// GET /api/posts/published
pub async fn published_posts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Envelope<Vec<PostView>>>> {
    page_of_posts(&state, &params, Some(true))
}

/// GET /api/posts/drafts
pub async fn draft_posts(
    State(state): State<Arc<AppState>>,
    viewer: OptionalUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Envelope<Vec<PostView>>>> {
    if !viewer.is_staff() {
        return Err(ApiError::Forbidden(
            "You do not have permission to view drafts".to_string(),
        ));
    }
    page_of_posts(&state, &params, Some(false))
}

/// GET /api/posts/tags
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Envelope<Vec<String>>>> {
    let filter = PostFilter {
        published: Some(true),
        ..PostFilter::default()
    };
    let tags = posts::all_tags(&state.db, &filter)?;
    Ok(json_single(tags))
}

/// GET /api/posts/:slug
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    viewer: OptionalUser,
    Path(slug): Path<String>,
) -> ApiResult<Json<Envelope<PostView>>> {
    match posts::get_post_by_slug(&state.db, &slug)? {
        Some(post) if post.published || viewer.is_staff() => Ok(json_single(post.into())),
        _ => Err(ApiError::NotFound("Post not found".to_string())),
    }
}

/// POST /api/posts
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    StaffUser(user): StaffUser,
    Json(input): Json<CreatePost>,
) -> ApiResult<(StatusCode, Json<Envelope<PostView>>)> {
    let post = posts::create_post(&state.db, input, user.id, &state.config.posts)?;
    Ok((StatusCode::CREATED, json_single(post.into())))
}

/// PUT/PATCH /api/posts/:slug
pub async fn update_post(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(slug): Path<String>,
    Json(input): Json<UpdatePost>,
) -> ApiResult<Json<Envelope<PostView>>> {
    let post = posts::update_post(&state.db, &slug, input, &state.config.posts)?;
    Ok(json_single(post.into()))
}

/// DELETE /api/posts/:slug
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    _staff: StaffUser,
    Path(slug): Path<String>,
) -> ApiResult<StatusCode> {
    posts::delete_post(&state.db, &slug)?;
    Ok(StatusCode::NO_CONTENT)
}
