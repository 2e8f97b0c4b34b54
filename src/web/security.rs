use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};
use axum::middleware::Next;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

pub fn security_headers<B>(mut response: Response<B>) -> Response<B> {
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );
    // JSON only; nothing here should ever be rendered as a document.
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}

pub async fn apply_security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let response = next.run(request).await;
    security_headers(response)
}

/// Sliding-window limiter for failed login attempts, keyed by username.
///
/// At most `max_keys` usernames are tracked. Once that many are held, expired
/// entries are swept, and if the map is still full the key whose last failure
/// is oldest is evicted.
pub struct RateLimiter {
    attempts: RwLock<HashMap<String, Vec<Instant>>>,
    max_attempts: usize,
    window: Duration,
    max_keys: usize,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(900))
    }
}

impl RateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_attempts,
            window,
            max_keys: 10_000,
        }
    }

    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys.max(1);
        self
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Vec<Instant>>> {
        self.attempts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True while `key` may still try.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.write();
        let Some(entry) = attempts.get_mut(key) else {
            return true;
        };
        entry.retain(|t| now.duration_since(*t) < self.window);
        if entry.is_empty() {
            attempts.remove(key);
            return true;
        }
        entry.len() < self.max_attempts
    }

    pub fn record_failure(&self, key: &str) {
        let now = Instant::now();
        let mut attempts = self.write();

        if !attempts.contains_key(key) && attempts.len() >= self.max_keys {
            attempts.retain(|_, times| {
                times.retain(|t| now.duration_since(*t) < self.window);
                !times.is_empty()
            });
            if attempts.len() >= self.max_keys {
                let stalest = attempts
                    .iter()
                    .min_by_key(|(_, times)| times.last().copied())
                    .map(|(k, _)| k.clone());
                if let Some(stalest) = stalest {
                    tracing::debug!("Login limiter full, evicting '{}'", stalest);
                    attempts.remove(&stalest);
                }
            }
        }

        attempts.entry(key.to_string()).or_default().push(now);
    }

    pub fn clear(&self, key: &str) {
        self.write().remove(key);
    }

    /// Number of usernames currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.attempts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
