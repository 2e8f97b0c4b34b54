use super::UserSummary;
use crate::services::tags::split_tags;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub summary: String,
    pub author: UserSummary,
    pub created_at: String,
    pub updated_at: String,
    pub published: bool,
    pub featured_image: Option<String>,
    pub tags: String,
}

impl Post {
    pub fn tag_list(&self) -> Vec<String> {
        split_tags(&self.tags).map(String::from).collect()
    }

    /// Estimated reading time in minutes, never less than one.
    pub fn reading_time(&self) -> u32 {
        let words = self.content.split_whitespace().count() as f64;
        ((words / WORDS_PER_MINUTE).round() as u32).max(1)
    }
}

/// A post as returned by the API, with its derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub tag_list: Vec<String>,
    pub reading_time: u32,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            tag_list: post.tag_list(),
            reading_time: post.reading_time(),
            post,
        }
    }
}

/// Tags as sent by clients: either `"a, b"` or `["a", "b"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    Text(String),
    List(Vec<String>),
}

impl Default for TagsInput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl TagsInput {
    pub fn to_raw(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(","),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePost {
    pub title: String,
    pub slug: Option<String>,
    pub content: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub published: bool,
    pub featured_image: Option<String>,
    #[serde(default)]
    pub tags: TagsInput,
}

/// Partial update. `slug: Some("")` asks for the slug to be derived again
/// from the (possibly new) title.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published: Option<bool>,
    pub featured_image: Option<String>,
    pub tags: Option<TagsInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrdering {
    #[default]
    NewestFirst,
    OldestFirst,
    RecentlyUpdated,
    LeastRecentlyUpdated,
    TitleAsc,
    TitleDesc,
}

impl FromStr for PostOrdering {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "-created_at" => Ok(Self::NewestFirst),
            "created_at" => Ok(Self::OldestFirst),
            "-updated_at" => Ok(Self::RecentlyUpdated),
            "updated_at" => Ok(Self::LeastRecentlyUpdated),
            "title" => Ok(Self::TitleAsc),
            "-title" => Ok(Self::TitleDesc),
            _ => Err(()),
        }
    }
}

impl PostOrdering {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::NewestFirst => "p.created_at DESC, p.id DESC",
            Self::OldestFirst => "p.created_at ASC, p.id ASC",
            Self::RecentlyUpdated => "p.updated_at DESC, p.id DESC",
            Self::LeastRecentlyUpdated => "p.updated_at ASC, p.id ASC",
            Self::TitleAsc => "p.title ASC, p.id ASC",
            Self::TitleDesc => "p.title DESC, p.id DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    /// `None` lists everything, `Some(true)` published only, `Some(false)` drafts only.
    pub published: Option<bool>,
    pub search: Option<String>,
    pub tags: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub ordering: PostOrdering,
}
