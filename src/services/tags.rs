use crate::models::Post;
use std::collections::BTreeSet;

/// Split a comma-separated tag field into trimmed, non-empty tags.
pub fn split_tags(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|tag| !tag.is_empty())
}

/// Canonical form of a tag field: deduplicated, byte-order sorted, comma-joined.
pub fn normalize_tags(raw: &str) -> String {
    let tags: BTreeSet<&str> = split_tags(raw).collect();
    tags.into_iter().collect::<Vec<_>>().join(",")
}

/// Distinct tags across `posts`, sorted.
pub fn collect_tags(posts: &[Post]) -> Vec<String> {
    let tags: BTreeSet<&str> = posts.iter().flat_map(|post| split_tags(&post.tags)).collect();
    tags.into_iter().map(String::from).collect()
}

