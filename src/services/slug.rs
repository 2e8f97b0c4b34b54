use crate::services::transliterate::transliterate;
use thiserror::Error;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub const MAX_SLUG_LENGTH: usize = 200;
pub const FALLBACK_TOKEN_LENGTH: usize = 8;
pub const MAX_SUFFIX_ATTEMPTS: u32 = 1000;
const RANDOM_SUFFIX_ATTEMPTS: usize = 3;

// Room for "-" plus the longest suffix we may append (random token or counter).
const SUFFIX_RESERVE: usize = 1 + FALLBACK_TOKEN_LENGTH;

#[derive(Debug, Error)]
pub enum SlugError {
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    ResolutionExhausted { base: String },
    #[error(transparent)]
    Lookup(#[from] anyhow::Error),
}

/// Storage-side existence check used while probing candidates.
///
/// Implementations must ignore the record identified by `exclude_id` so that
/// an update does not collide with its own current slug.
pub trait SlugLookup {
    fn slug_exists(&self, candidate: &str, exclude_id: Option<i64>) -> anyhow::Result<bool>;
}

impl<F> SlugLookup for F
where
    F: Fn(&str, Option<i64>) -> anyhow::Result<bool>,
{
    fn slug_exists(&self, candidate: &str, exclude_id: Option<i64>) -> anyhow::Result<bool> {
        self(candidate, exclude_id)
    }
}

/// Lowercase `input` and turn every run of characters outside `[a-z0-9]`
/// into one hyphen. Accents are folded through NFKD first; any other
/// non-ASCII character is a separator like punctuation is.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for ch in input.nfkd().filter(|c| !is_combining_mark(*c)) {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

pub fn generate_slug(title: &str) -> String {
    slugify(&transliterate(title))
}

pub fn validate_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > MAX_SLUG_LENGTH {
        return false;
    }
    slug.split('-').all(|part| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    })
}

/// Short random lowercase hex token used when a title yields no slug at all.
pub fn fallback_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(FALLBACK_TOKEN_LENGTH);
    token
}

pub fn resolve_unique_slug<L>(
    title: &str,
    lookup: &L,
    exclude_id: Option<i64>,
) -> Result<String, SlugError>
where
    L: SlugLookup + ?Sized,
{
    let base = truncate_base(&generate_slug(title), MAX_SLUG_LENGTH - SUFFIX_RESERVE);

    if base.is_empty() {
        let token = fallback_token();
        tracing::debug!("Title {:?} produced no slug, using token {}", title, token);
        return Ok(token);
    }

    if !lookup.slug_exists(&base, exclude_id)? {
        return Ok(base);
    }

    for counter in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = format!("{}-{}", base, counter);
        if !lookup.slug_exists(&candidate, exclude_id)? {
            return Ok(candidate);
        }
    }

    tracing::warn!(
        "{} numbered variants of '{}' are taken, falling back to random suffixes",
        MAX_SUFFIX_ATTEMPTS,
        base
    );
    for _ in 0..RANDOM_SUFFIX_ATTEMPTS {
        let candidate = format!("{}-{}", base, fallback_token());
        if !lookup.slug_exists(&candidate, exclude_id)? {
            return Ok(candidate);
        }
    }

    Err(SlugError::ResolutionExhausted { base })
}

/// Cut a slug to at most `max_len` bytes, preferring a hyphen boundary.
/// Slugs are pure ASCII, so byte offsets are char boundaries.
fn truncate_base(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }
    let cut = &slug[..max_len];
    let cut = match cut.rfind('-') {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut,
    };
    cut.trim_end_matches('-').to_string()
}
