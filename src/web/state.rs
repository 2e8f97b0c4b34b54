use crate::web::security::RateLimiter;
use crate::{Config, Database};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub login_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: Database) -> Self {
        Self {
            config,
            db,
            login_limiter: Arc::new(RateLimiter::default()),
        }
    }
}
