use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub posts: PostsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PostsConfig {
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
    #[serde(default = "default_summary_length")]
    pub summary_length: usize,
    /// How many times a write is retried after losing a slug race.
    #[serde(default = "default_slug_retry_attempts")]
    pub slug_retry_attempts: u32,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self {
            per_page: default_per_page(),
            max_per_page: default_max_per_page(),
            summary_length: default_summary_length(),
            slug_retry_attempts: default_slug_retry_attempts(),
        }
    }
}

fn default_title() -> String {
    "My Blog".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_path() -> String {
    "./data/jotter.db".to_string()
}

fn default_pool_size() -> u32 {
    10
}

fn default_per_page() -> usize {
    10
}

fn default_max_per_page() -> usize {
    100
}

fn default_summary_length() -> usize {
    200
}

fn default_slug_retry_attempts() -> u32 {
    3
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Could not read config file '{}': {}. Run `jotter init` to create one.",
                path.display(),
                e
            )
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.posts.max_per_page == 0 || self.posts.max_per_page > 1000 {
            anyhow::bail!("posts.max_per_page must be between 1 and 1000");
        }
        if self.posts.per_page == 0 {
            anyhow::bail!("posts.per_page must be greater than 0");
        }
        if self.posts.per_page > self.posts.max_per_page {
            anyhow::bail!("posts.per_page must not exceed posts.max_per_page");
        }
        if self.posts.summary_length == 0 {
            anyhow::bail!("posts.summary_length must be greater than 0");
        }
        if self.posts.slug_retry_attempts == 0 {
            anyhow::bail!("posts.slug_retry_attempts must be at least 1");
        }
        if self.database.pool_size == 0 {
            anyhow::bail!("database.pool_size must be greater than 0");
        }
        Ok(())
    }
}
