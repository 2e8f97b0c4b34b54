use crate::models::{CreatePost, TagsInput};
use crate::services::{auth, posts};
use crate::{Config, Database};
use anyhow::Result;
use std::path::Path;

struct SamplePost {
    title: &'static str,
    slug: &'static str,
    content: &'static str,
    summary: &'static str,
    tags: &'static [&'static str],
}

const SAMPLE_POSTS: &[SamplePost] = &[
    SamplePost {
        title: "现代化博客开发实践",
        slug: "modern-blog-development",
        content: "在这篇文章中，我们将探讨如何使用 Vue.js 和 Django 构建现代化的博客系统...",
        summary: "探索使用 Vue.js 和 Django 构建博客系统的最佳实践",
        tags: &["Vue.js", "Django", "Web Development"],
    },
    SamplePost {
        title: "RESTful API 最佳实践",
        slug: "restful-api-best-practices",
        content: "RESTful API 设计的核心原则和最佳实践，包括认证、版本控制、错误处理等...",
        summary: "深入理解 RESTful API 设计原则和实践指南",
        tags: &["API", "REST", "Backend"],
    },
    SamplePost {
        title: "Python 异步编程指南",
        slug: "python-async-programming-guide",
        content: "详细介绍 Python 中的异步编程概念，包括 async/await、协程等...",
        summary: "学习 Python 异步编程的基础知识和进阶技巧",
        tags: &["Python", "Async", "Programming"],
    },
];

pub async fn run(config_path: &Path, author: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    let db = Database::open(&config.database.path, config.database.pool_size)?;
    db.migrate()?;

    let created = seed_posts(&db, author, &config)?;
    tracing::info!("Seeded {} sample post(s)", created);

    Ok(())
}

/// Insert the sample posts that are not there yet; returns how many were created.
pub fn seed_posts(db: &Database, author: &str, config: &Config) -> Result<usize> {
    let user = auth::get_user_by_username(db, author)?
        .ok_or_else(|| anyhow::anyhow!("User '{}' not found", author))?;

    let mut created = 0;
    for sample in SAMPLE_POSTS {
        if posts::get_post_by_slug(db, sample.slug)?.is_some() {
            tracing::debug!("Sample post '{}' already exists", sample.slug);
            continue;
        }
        let input = CreatePost {
            title: sample.title.to_string(),
            slug: Some(sample.slug.to_string()),
            content: sample.content.to_string(),
            summary: Some(sample.summary.to_string()),
            published: true,
            featured_image: None,
            tags: TagsInput::List(sample.tags.iter().map(|t| t.to_string()).collect()),
        };
        let post = posts::create_post(db, input, user.id, &config.posts)?;
        tracing::info!("Created post: {}", post.title);
        created += 1;
    }

    Ok(created)
}
