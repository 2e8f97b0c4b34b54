use crate::config::PostsConfig;
use crate::models::{CreatePost, Post, PostFilter, UpdatePost, UserSummary};
use crate::services::slug::{resolve_unique_slug, validate_slug, SlugError, SlugLookup};
use crate::services::tags::{collect_tags, normalize_tags};
use crate::Database;
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_TAGS_LENGTH: usize = 200;

/// Path segments under `/api/posts/` that are routes, not slugs.
pub const RESERVED_SLUGS: [&str; 3] = ["published", "drafts", "tags"];

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.content, p.summary, p.author_id, u.username, \
     p.created_at, p.updated_at, p.published, p.featured_image, p.tags";

const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

#[derive(Debug, Error)]
pub enum PostError {
    #[error("{0}")]
    Invalid(String),
    #[error("post not found")]
    NotFound,
    #[error("slug `{slug}` was claimed by a concurrent write")]
    SlugConflict { slug: String },
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for PostError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}

impl From<SlugError> for PostError {
    fn from(err: SlugError) -> Self {
        match err {
            SlugError::ResolutionExhausted { base } => {
                Self::WriteFailed(format!("no free slug left for '{}'", base))
            }
            SlugError::Lookup(e) => Self::Storage(e),
        }
    }
}

/// Slug lookup against the `posts` table. Reserved words always count as taken.
struct PostSlugs<'a> {
    conn: &'a Connection,
}

impl SlugLookup for PostSlugs<'_> {
    fn slug_exists(&self, candidate: &str, exclude_id: Option<i64>) -> anyhow::Result<bool> {
        if RESERVED_SLUGS.contains(&candidate) {
            return Ok(true);
        }
        let exists = match exclude_id {
            Some(id) => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ? AND id != ?)",
                (candidate, id),
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM posts WHERE slug = ?)",
                [candidate],
                |row| row.get(0),
            )?,
        };
        Ok(exists)
    }
}

fn is_slug_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("posts.slug")
        }
        _ => false,
    }
}

/// Run `write` again whenever it loses a slug race, at most `attempts` times.
pub fn with_slug_retry<T, F>(attempts: u32, mut write: F) -> Result<T, PostError>
where
    F: FnMut(u32) -> Result<T, PostError>,
{
    for attempt in 1..=attempts {
        match write(attempt) {
            Err(PostError::SlugConflict { slug }) => {
                tracing::warn!(
                    "Slug '{}' was claimed concurrently (attempt {}/{})",
                    slug,
                    attempt,
                    attempts
                );
            }
            result => return result,
        }
    }
    Err(PostError::WriteFailed(format!(
        "could not claim a unique slug after {} attempts",
        attempts
    )))
}

/// Plain-text summary of at most `max_chars` characters, cut on a word boundary.
pub fn derive_summary(content: &str, max_chars: usize) -> String {
    let text = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.chars().count() <= max_chars {
        return text;
    }

    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(' ') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", cut.trim_end())
}

fn validate_title(title: &str) -> Result<(), PostError> {
    if title.is_empty() {
        return Err(PostError::Invalid("Title cannot be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(PostError::Invalid(format!(
            "Title must be {} characters or less",
            MAX_TITLE_LENGTH
        )));
    }
    Ok(())
}

fn validate_content(content: &str) -> Result<(), PostError> {
    if content.trim().is_empty() {
        return Err(PostError::Invalid("Content cannot be empty".into()));
    }
    Ok(())
}

fn canonical_tags(raw: &str) -> Result<String, PostError> {
    let tags = normalize_tags(raw);
    if tags.chars().count() > MAX_TAGS_LENGTH {
        return Err(PostError::Invalid(format!(
            "Tags must be {} characters or less",
            MAX_TAGS_LENGTH
        )));
    }
    Ok(tags)
}

fn clean_featured_image(value: Option<String>) -> Result<Option<String>, PostError> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    match url::Url::parse(&value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(Some(value)),
        _ => Err(PostError::Invalid(format!(
            "Featured image must be an http(s) URL, got '{}'",
            value
        ))),
    }
}

fn check_explicit_slug<L>(lookup: &L, slug: &str, exclude_id: Option<i64>) -> Result<(), PostError>
where
    L: SlugLookup + ?Sized,
{
    if !validate_slug(slug) {
        return Err(PostError::Invalid(
            "Invalid slug: must be 1-200 characters, lowercase letters, numbers, and single hyphens only"
                .into(),
        ));
    }
    if RESERVED_SLUGS.contains(&slug) {
        return Err(PostError::Invalid(format!("Slug '{}' is reserved", slug)));
    }
    if lookup.slug_exists(slug, exclude_id)? {
        return Err(PostError::Invalid(format!(
            "A post with slug '{}' already exists",
            slug
        )));
    }
    Ok(())
}

fn duplicate_slug(slug: String, derived: bool) -> PostError {
    if derived {
        PostError::SlugConflict { slug }
    } else {
        PostError::Invalid(format!("A post with slug '{}' already exists", slug))
    }
}

pub fn create_post(
    db: &Database,
    input: CreatePost,
    author_id: i64,
    config: &PostsConfig,
) -> Result<Post, PostError> {
    let conn = db.get()?;
    insert_post(&conn, input, author_id, config, &PostSlugs { conn: &conn })
}

/// [`create_post`] with the availability check supplied by the caller.
///
/// `lookup` only steers slug selection. The unique index on `posts.slug` still
/// has the final say, so a lookup that reports a taken slug as free ends in
/// a retry (derived slug) or a validation error (explicit slug).
pub fn create_post_with_lookup<L>(
    db: &Database,
    input: CreatePost,
    author_id: i64,
    config: &PostsConfig,
    lookup: &L,
) -> Result<Post, PostError>
where
    L: SlugLookup + ?Sized,
{
    let conn = db.get()?;
    insert_post(&conn, input, author_id, config, lookup)
}

fn insert_post<L>(
    conn: &Connection,
    input: CreatePost,
    author_id: i64,
    config: &PostsConfig,
    lookup: &L,
) -> Result<Post, PostError>
where
    L: SlugLookup + ?Sized,
{
    let title = input.title.trim().to_string();
    validate_title(&title)?;
    validate_content(&input.content)?;
    let tags = canonical_tags(&input.tags.to_raw())?;
    let featured_image = clean_featured_image(input.featured_image)?;
    let summary = match input.summary.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => derive_summary(&input.content, config.summary_length),
    };
    let explicit_slug = input
        .slug
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if let Some(slug) = &explicit_slug {
        check_explicit_slug(lookup, slug, None)?;
    }

    let id = with_slug_retry(config.slug_retry_attempts, |_| {
        let slug = match &explicit_slug {
            Some(slug) => slug.clone(),
            None => resolve_unique_slug(&title, lookup, None)?,
        };
        let inserted = conn.execute(
            "INSERT INTO posts (title, slug, content, summary, author_id, published, featured_image, tags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                &title,
                &slug,
                &input.content,
                &summary,
                author_id,
                input.published,
                &featured_image,
                &tags,
            ),
        );
        match inserted {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_slug_violation(&e) => Err(duplicate_slug(slug, explicit_slug.is_none())),
            Err(e) => Err(e.into()),
        }
    })?;

    let post = fetch_post(conn, "p.id = ?", id)?.ok_or(PostError::NotFound)?;
    tracing::info!("Created post {} '{}'", post.id, post.slug);
    Ok(post)
}

enum SlugPlan {
    Keep(String),
    Explicit(String),
    Derive,
}

pub fn update_post(
    db: &Database,
    slug: &str,
    input: UpdatePost,
    config: &PostsConfig,
) -> Result<Post, PostError> {
    let conn = db.get()?;
    let current = fetch_post(&conn, "p.slug = ?", slug)?.ok_or(PostError::NotFound)?;

    let title = match input.title {
        Some(title) => {
            let title = title.trim().to_string();
            validate_title(&title)?;
            title
        }
        None => current.title,
    };
    let content = match input.content {
        Some(content) => {
            validate_content(&content)?;
            content
        }
        None => current.content,
    };
    let summary = match input.summary {
        Some(s) if s.trim().is_empty() => derive_summary(&content, config.summary_length),
        Some(s) => s.trim().to_string(),
        None => current.summary,
    };
    let tags = match input.tags {
        Some(tags) => canonical_tags(&tags.to_raw())?,
        None => current.tags,
    };
    let featured_image = match input.featured_image {
        Some(value) => clean_featured_image(Some(value))?,
        None => current.featured_image,
    };
    let published = input.published.unwrap_or(current.published);

    let plan = match input.slug.map(|s| s.trim().to_string()) {
        None => SlugPlan::Keep(current.slug),
        Some(s) if s.is_empty() => SlugPlan::Derive,
        Some(s) if s == current.slug => SlugPlan::Keep(s),
        Some(s) => {
            check_explicit_slug(&PostSlugs { conn: &conn }, &s, Some(current.id))?;
            SlugPlan::Explicit(s)
        }
    };

    with_slug_retry(config.slug_retry_attempts, |_| {
        let slug = match &plan {
            SlugPlan::Keep(s) | SlugPlan::Explicit(s) => s.clone(),
            SlugPlan::Derive => {
                resolve_unique_slug(&title, &PostSlugs { conn: &conn }, Some(current.id))?
            }
        };
        let updated = conn.execute(
            &format!(
                "UPDATE posts SET title = ?, slug = ?, content = ?, summary = ?, published = ?,
                 featured_image = ?, tags = ?, updated_at = {} WHERE id = ?",
                NOW
            ),
            (
                &title,
                &slug,
                &content,
                &summary,
                published,
                &featured_image,
                &tags,
                current.id,
            ),
        );
        match updated {
            Ok(_) => Ok(()),
            Err(e) if is_slug_violation(&e) => {
                Err(duplicate_slug(slug, matches!(plan, SlugPlan::Derive)))
            }
            Err(e) => Err(e.into()),
        }
    })?;

    let post = fetch_post(&conn, "p.id = ?", current.id)?.ok_or(PostError::NotFound)?;
    tracing::info!("Updated post {} '{}'", post.id, post.slug);
    Ok(post)
}

pub fn delete_post(db: &Database, slug: &str) -> Result<(), PostError> {
    let conn = db.get()?;
    let affected = conn.execute("DELETE FROM posts WHERE slug = ?", [slug])?;
    if affected == 0 {
        return Err(PostError::NotFound);
    }
    tracing::info!("Deleted post '{}'", slug);
    Ok(())
}

pub fn get_post_by_slug(db: &Database, slug: &str) -> anyhow::Result<Option<Post>> {
    let conn = db.get()?;
    Ok(fetch_post(&conn, "p.slug = ?", slug)?)
}

pub fn list_posts(
    db: &Database,
    filter: &PostFilter,
    limit: usize,
    offset: usize,
) -> anyhow::Result<Vec<Post>> {
    let conn = db.get()?;
    query_posts(&conn, filter, Some((limit, offset)))
}

pub fn count_posts(db: &Database, filter: &PostFilter) -> anyhow::Result<i64> {
    let conn = db.get()?;
    let (clause, params) = filter_clause(filter);
    let sql = format!("SELECT COUNT(*) FROM posts p{}", clause);
    let param_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    let count: i64 = conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))?;
    Ok(count)
}

/// Every distinct tag used by posts matching `filter`.
pub fn all_tags(db: &Database, filter: &PostFilter) -> anyhow::Result<Vec<String>> {
    let conn = db.get()?;
    let posts = query_posts(&conn, filter, None)?;
    Ok(collect_tags(&posts))
}

fn fetch_post<P: rusqlite::ToSql>(
    conn: &Connection,
    condition: &str,
    param: P,
) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id WHERE {}",
            POST_COLUMNS, condition
        ),
        [param],
        row_to_post,
    )
    .optional()
}

fn query_posts(
    conn: &Connection,
    filter: &PostFilter,
    page: Option<(usize, usize)>,
) -> anyhow::Result<Vec<Post>> {
    let (clause, params) = filter_clause(filter);
    let sql = format!(
        "SELECT {} FROM posts p JOIN users u ON u.id = p.author_id{} ORDER BY {} LIMIT ? OFFSET ?",
        POST_COLUMNS,
        clause,
        filter.ordering.sql()
    );

    // SQLite reads a negative LIMIT as "no limit".
    let (limit, offset) = page
        .map(|(limit, offset)| (limit as i64, offset as i64))
        .unwrap_or((-1, 0));
    let mut param_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|s| s as &dyn rusqlite::ToSql).collect();
    param_refs.push(&limit);
    param_refs.push(&offset);

    let mut stmt = conn.prepare(&sql)?;
    let posts = stmt
        .query_map(param_refs.as_slice(), row_to_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn filter_clause(filter: &PostFilter) -> (String, Vec<String>) {
    let mut sql = String::from(" WHERE 1=1");
    let mut params: Vec<String> = Vec::new();

    match filter.published {
        Some(true) => sql.push_str(" AND p.published = 1"),
        Some(false) => sql.push_str(" AND p.published = 0"),
        None => {}
    }

    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        sql.push_str(
            " AND (p.title LIKE ? ESCAPE '\\' OR p.content LIKE ? ESCAPE '\\' \
             OR p.summary LIKE ? ESCAPE '\\' OR p.tags LIKE ? ESCAPE '\\')",
        );
        let pattern = format!("%{}%", escape_like(term));
        params.extend(std::iter::repeat(pattern).take(4));
    }

    let tags: Vec<&str> = filter
        .tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        let matches = vec!["instr(',' || lower(p.tags) || ',', ',' || lower(?) || ',') > 0"; tags.len()];
        sql.push_str(&format!(" AND ({})", matches.join(" OR ")));
        params.extend(tags.into_iter().map(String::from));
    }

    if let Some(start) = filter.start_date {
        sql.push_str(" AND p.created_at >= ?");
        params.push(start.format("%Y-%m-%d").to_string());
    }
    if let Some(next_day) = filter.end_date.and_then(|end| end.succ_opt()) {
        sql.push_str(" AND p.created_at < ?");
        params.push(next_day.format("%Y-%m-%d").to_string());
    }

    (sql, params)
}

fn row_to_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        summary: row.get(4)?,
        author: UserSummary {
            id: row.get(5)?,
            username: row.get(6)?,
        },
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        published: row.get(9)?,
        featured_image: row.get(10)?,
        tags: row.get(11)?,
    })
}
